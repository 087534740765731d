use std::io;

use anyerror::AnyError;

use crate::config::ConfigError;
use crate::errors::NetworkError;
use crate::message::GroupId;

/// The set of errors surfaced to callers of the public API, either as a
/// direct return value or through a completion signal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A proposal or operation named a group this node does not carry,
    /// e.g. one that has been removed.
    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("command id must be {expected} bytes, got {got}")]
    InvalidCommandId { expected: usize, got: usize },

    /// The coordinator is draining; the operation was refused or failed
    /// rather than left to wedge.
    #[error("multiraft is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("storage: {0}")]
    Storage(AnyError),

    #[error("raft: {0}")]
    Raft(AnyError),
}

impl Error {
    pub(crate) fn storage(e: &io::Error) -> Self {
        Error::Storage(AnyError::new(e))
    }

    pub(crate) fn raft(e: &raft::Error) -> Self {
        Error::Raft(AnyError::new(e))
    }
}
