use std::error::Error as StdError;

use anyerror::AnyError;

/// Error raised when handing a message to the transport, or when the
/// transport rejects a listener registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("NetworkError: {source}")]
pub struct NetworkError {
    #[from]
    source: AnyError,
}

impl NetworkError {
    pub fn new<E: StdError + 'static>(e: &E) -> Self {
        Self {
            source: AnyError::new(e),
        }
    }
}
