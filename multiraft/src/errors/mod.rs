//! Error types exposed by this crate.
//!
//! Three layers: [`ConfigError`](crate::ConfigError) at startup,
//! caller-visible [`Error`] returned through the API and completion signals,
//! and [`Fatal`] which terminates the coordinator loop. Waiting on metrics
//! has its own small [`WaitError`](crate::WaitError).

mod error;
mod fatal;
mod network_error;

use std::fmt;

use anyerror::AnyError;
use tracing::error;

pub use self::error::Error;
pub use self::fatal::Fatal;
pub use self::network_error::NetworkError;

/// Logs an error and wraps it for transport across component boundaries.
pub(crate) fn to_any_error<E: fmt::Display + 'static>(e: E) -> AnyError {
    error!("error: {}", e);
    AnyError::error(e)
}
