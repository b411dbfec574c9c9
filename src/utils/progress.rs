//! Progress reporting for environment installation.
//!
//! The install coordinator reports phases through the [`ProgressSink`] trait so that
//! library callers can forward them anywhere (a UI, a log, nothing at all). The CLI uses
//! [`SpinnerProgress`], an `indicatif` spinner that hides itself in non-interactive runs.
//!
//! # Environment Variables
//!
//! - `ENVSLOT_NO_PROGRESS`: Set to any value to disable the spinner

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// Receiver of install progress messages.
///
/// Implementations must be cheap and non-blocking: messages are emitted from inside
/// the coordinator while other callers may be waiting on the same install.
pub trait ProgressSink: Send + Sync {
    /// A new phase started (e.g. "Installing environment").
    fn begin(&self, message: &str);

    /// Informational update within the current phase.
    fn update(&self, message: &str);

    /// The operation finished; `success` tells whether it succeeded.
    fn finish(&self, message: &str, success: bool);
}

/// A sink that discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin(&self, _message: &str) {}

    fn update(&self, _message: &str) {}

    fn finish(&self, _message: &str, _success: bool) {}
}

/// Check if progress indicators are disabled via `ENVSLOT_NO_PROGRESS`.
fn is_progress_disabled() -> bool {
    std::env::var("ENVSLOT_NO_PROGRESS").is_ok()
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}

/// Terminal spinner backed by `indicatif`.
#[derive(Clone)]
pub struct SpinnerProgress {
    inner: IndicatifBar,
}

impl SpinnerProgress {
    /// Create a spinner; hidden when `disabled` or `ENVSLOT_NO_PROGRESS` is set.
    #[must_use]
    pub fn new(disabled: bool) -> Self {
        let inner = if disabled || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar
        };
        Self { inner }
    }
}

impl ProgressSink for SpinnerProgress {
    fn begin(&self, message: &str) {
        self.inner.set_message(message.to_string());
        self.inner.enable_steady_tick(Duration::from_millis(100));
    }

    fn update(&self, message: &str) {
        self.inner.set_message(message.to_string());
    }

    fn finish(&self, message: &str, success: bool) {
        self.inner.disable_steady_tick();
        if success {
            self.inner.finish_with_message(format!("✓ {message}"));
        } else {
            self.inner.abandon_with_message(format!("✗ {message}"));
        }
    }
}
