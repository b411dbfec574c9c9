//! Error handling for envslot
//!
//! The library surface returns [`EnvError`] so callers can branch on the failure class
//! (validation, IO, collision exhaustion, installer failure, cancellation). The CLI layer
//! wraps these in [`anyhow::Error`] and renders them through [`user_friendly_error`].
//!
//! # Error Categories
//!
//! - **Validation**: [`EnvError::Validation`] for unsupported or malformed lockfiles
//! - **File System**: [`EnvError::Io`] with the failed operation and path
//! - **Cache**: [`EnvError::CollisionExhausted`] when no slot could be found
//! - **Installer**: [`EnvError::ProcessFailure`], [`EnvError::Timeout`],
//!   [`EnvError::InstallerNotFound`]
//! - **Control flow**: [`EnvError::Cancelled`], [`EnvError::Interrupted`]
//!
//! # Sharing Outcomes
//!
//! One install attempt is observed by every concurrent waiter, so [`EnvError`] is
//! `Clone`. IO sources are kept behind an [`Arc`] to make that possible.
//!
//! # Examples
//!
//! ```rust
//! use envslot::core::{EnvError, user_friendly_error};
//!
//! let err = EnvError::validation("unsupported lockfile version 5, version 6 is required");
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! assert!(ctx.to_string().contains("version 6"));
//! ```

use colored::Colorize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result alias used by every library operation.
pub type EnvResult<T> = Result<T, EnvError>;

/// All failures the cache, localizer, installer and coordinator can report.
#[derive(Error, Debug, Clone)]
pub enum EnvError {
    /// The lockfile document has an unsupported or malformed shape.
    #[error("Invalid lockfile: {message}")]
    Validation {
        /// Human readable description naming the offending field or value
        message: String,
    },

    /// A disk or process IO operation failed.
    #[error("Failed {operation}: {}", .path.display())]
    Io {
        /// What was being attempted (e.g. "writing sentinel file")
        operation: String,
        /// The path involved in the operation
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Every candidate directory for a content hash is occupied by different content.
    #[error("No free cache slot for {} after {attempts} attempts", .base.display())]
    CollisionExhausted {
        /// The first candidate directory that was probed
        base: PathBuf,
        /// How many candidates were tried
        attempts: usize,
    },

    /// The installer ran but exited unsuccessfully.
    #[error("Environment installation failed with exit code {exit_code}: {}", .stderr.trim())]
    ProcessFailure {
        /// Exit code of the installer, `-1` when terminated by a signal
        exit_code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// The installer did not finish within the configured bound and was killed.
    #[error("Environment installation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The installer executable could not be located.
    #[error("Installer executable '{name}' not found")]
    InstallerNotFound {
        /// Name or path that was looked up
        name: String,
    },

    /// The caller's cancellation token fired while it was waiting.
    #[error("Operation cancelled")]
    Cancelled,

    /// A worker task was aborted or panicked before producing an outcome.
    #[error("Operation interrupted: {0}")]
    Interrupted(String),
}

impl EnvError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an IO error with the operation and path that failed.
    pub fn io(operation: impl Into<String>, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.as_ref().to_path_buf(),
            source: Arc::new(source),
        }
    }

    /// Whether a later call may succeed without any change to the inputs.
    ///
    /// Validation failures are deterministic for a given document and are never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation { .. } | Self::CollisionExhausted { .. })
    }
}

impl From<tokio::task::JoinError> for EnvError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Interrupted(err.to_string())
    }
}

/// Error wrapper carrying a suggestion and details for terminal display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error message
    pub error: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context without suggestion or details.
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with actionable suggestions.
///
/// [`EnvError`] variants get tailored suggestions. Anything else is shown with its
/// full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(env_error) = error.downcast_ref::<EnvError>() {
        return create_error_context(env_error);
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(message)
}

fn create_error_context(error: &EnvError) -> ErrorContext {
    match error {
        EnvError::Validation { .. } => ErrorContext::new(error)
            .with_suggestion("Regenerate the lockfile with a current package manager (lockfile format version 6)")
            .with_details("Validation errors are not retried; the same document will fail again"),

        EnvError::Io { source, .. } => ErrorContext::new(error)
            .with_details(source.to_string())
            .with_suggestion("Check that the cache root exists and is writable"),

        EnvError::CollisionExhausted { .. } => ErrorContext::new(error)
            .with_suggestion("Remove stale slot directories from the cache root or choose a new cache root")
            .with_details("Each candidate directory already holds a different environment"),

        EnvError::ProcessFailure { stdout, .. } => {
            let ctx = ErrorContext::new(error)
                .with_suggestion("Run with --verbose to see the full installer output");
            if stdout.trim().is_empty() {
                ctx
            } else {
                ctx.with_details(stdout.trim().to_string())
            }
        }

        EnvError::Timeout(_) => ErrorContext::new(error)
            .with_suggestion("Raise install_timeout_secs in the configuration file"),

        EnvError::InstallerNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Install pixi or set installer_path in the configuration file"),

        EnvError::Cancelled | EnvError::Interrupted(_) => ErrorContext::new(error),
    }
}
