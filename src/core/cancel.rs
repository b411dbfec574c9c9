//! Cooperative cancellation for waiting callers.
//!
//! A [`CancelToken`] only ever affects the caller that owns it: cancelling a waiter
//! never aborts an installation that other callers are still waiting on.

use super::error::{EnvError, EnvResult};

pub use tokio_util::sync::CancellationToken as CancelToken;

/// Convenience checks on [`CancelToken`].
pub trait CancelCheck {
    /// Return [`EnvError::Cancelled`] if the token has fired.
    fn check(&self) -> EnvResult<()>;
}

impl CancelCheck for CancelToken {
    fn check(&self) -> EnvResult<()> {
        if self.is_cancelled() {
            Err(EnvError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Cancel `token` when the process receives Ctrl-C.
///
/// Used by the CLI so an interrupted `install` stops waiting instead of hanging.
pub fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}
