use std::io;

use anyerror::AnyError;

/// Fatal is unrecoverable and shuts the coordinator loop down at once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fatal {
    /// Durability could not be provided; callers rely on it and retrying is
    /// out of scope.
    #[error(transparent)]
    StorageError(#[from] AnyError),

    /// A protocol invariant was violated, e.g. undecodable conf-change data.
    #[error("invariant violated: {0}")]
    InvariantViolation(AnyError),

    /// The coordinator stopped normally.
    #[error("stopped normally")]
    Stopped,
}

impl From<io::Error> for Fatal {
    fn from(value: io::Error) -> Self {
        Fatal::StorageError(AnyError::new(&value))
    }
}
