//! The durable storage interface, one log per group.

use std::io;

use raft::eraftpb::ConfState;
use raft::eraftpb::Entry;
use raft::eraftpb::HardState;
use raft::eraftpb::Snapshot;

use crate::message::GroupId;

/// Storage for one group's log and Raft state.
///
/// The read half is the embedded Raft's own [`raft::Storage`] trait, reused
/// verbatim; the write half is what the write task calls to persist a batch.
/// Handles are cheap clones of a shared underlying store: the coordinator
/// hands one clone to the embedded Raft instance and the write task fetches
/// its own.
///
/// All writes must be durable when the call returns; the correctness of the
/// whole coordinator rests on entries being stable before any committed entry
/// is applied or any message is sent.
pub trait GroupStorage:
    raft::Storage + Clone + Send + Sync + 'static
{
    /// Append entries to the log. Entries must be consecutive with what is
    /// already stored.
    fn append(&self, entries: &[Entry]) -> io::Result<()>;

    /// Persist the group's `(term, vote, commit)` triple.
    fn set_hard_state(&self, hard_state: &HardState) -> io::Result<()>;

    /// Overwrite log and state from a snapshot.
    fn apply_snapshot(&self, snapshot: &Snapshot) -> io::Result<()>;

    /// Record the membership produced by applying a conf change, so that
    /// later snapshots carry the current member set.
    fn set_conf_state(&self, conf_state: &ConfState) -> io::Result<()>;
}

/// Hands out per-group storage.
///
/// Requesting the storage of an unknown group returns an empty, writable
/// store; that is what makes lazy group creation on inbound messages work.
pub trait Storage: Send + Sync + 'static {
    type GroupStorage: GroupStorage;

    fn group_storage(
        &self,
        group_id: GroupId,
    ) -> io::Result<Self::GroupStorage>;
}
