//! Core types shared by every envslot module.
//!
//! - [`error`]: the [`EnvError`] taxonomy and terminal rendering helpers
//! - [`cancel`]: the cancellation token handed to waiting callers

pub mod cancel;
pub mod error;

pub use cancel::CancelToken;
pub use error::{EnvError, EnvResult, ErrorContext, user_friendly_error};
