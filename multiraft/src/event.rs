//! Events published to the application.
//!
//! The owner of a [`MultiRaft`](crate::MultiRaft) must drain the event stream
//! in a timely manner; a full event queue is treated as a liveness bug, not a
//! steady-state condition.

use std::fmt;

use raft::eraftpb::ConfChange;
use raft::eraftpb::ConfChangeType;
use tokio::sync::mpsc;
use tracing::warn;

use crate::command::CommandId;
use crate::core::io::callback::Callback;
use crate::message::GroupId;
use crate::message::NodeId;

/// The kind of a proposed group membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum MembershipChange {
    AddNode,
    RemoveNode,
    /// Replaces a member's application-level metadata without touching the
    /// peer set.
    UpdateNode,
}

impl MembershipChange {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            MembershipChange::AddNode => 0,
            MembershipChange::RemoveNode => 1,
            MembershipChange::UpdateNode => 2,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(MembershipChange::AddNode),
            1 => Some(MembershipChange::RemoveNode),
            2 => Some(MembershipChange::UpdateNode),
            _ => None,
        }
    }

    /// The embedded-Raft representation. An update travels as an add of an
    /// existing member; the coordinator recovers the real kind from the
    /// conf-change context and skips the peer-set application.
    pub(crate) fn conf_change_type(self) -> ConfChangeType {
        match self {
            MembershipChange::AddNode => ConfChangeType::AddNode,
            MembershipChange::RemoveNode => ConfChangeType::RemoveNode,
            MembershipChange::UpdateNode => ConfChangeType::AddNode,
        }
    }

    pub(crate) fn from_conf_change_type(t: ConfChangeType) -> Self {
        match t {
            ConfChangeType::AddNode => MembershipChange::AddNode,
            ConfChangeType::RemoveNode => MembershipChange::RemoveNode,
            ConfChangeType::AddLearnerNode => MembershipChange::AddNode,
        }
    }
}

impl fmt::Display for MembershipChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An event emitted by the coordinator, in commit order per group.
#[derive(Debug)]
pub enum Event {
    /// A normal command committed. The command id prefix has already been
    /// stripped from the payload.
    CommandCommitted {
        group_id: GroupId,
        command_id: CommandId,
        payload: Vec<u8>,
        index: u64,
    },

    /// A membership change committed. The application must invoke
    /// [`MembershipAck::ack`] once it has durably applied the change; only
    /// then does the coordinator apply it to the embedded Raft and release
    /// the next queued membership change.
    MembershipChangeCommitted {
        group_id: GroupId,
        command_id: CommandId,
        index: u64,
        node_id: NodeId,
        kind: MembershipChange,
        payload: Vec<u8>,
        ack: MembershipAck,
    },

    /// The committed term of a group advanced under a known leader.
    LeaderElection {
        group_id: GroupId,
        node_id: NodeId,
        term: u64,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CommandCommitted {
                group_id,
                command_id,
                payload,
                index,
            } => {
                write!(
                    f,
                    "CommandCommitted{{group={}, command_id={}, {} bytes, index={}}}",
                    group_id,
                    command_id,
                    payload.len(),
                    index
                )
            }
            Event::MembershipChangeCommitted {
                group_id,
                command_id,
                index,
                node_id,
                kind,
                ..
            } => {
                write!(
                    f,
                    "MembershipChangeCommitted{{group={}, command_id={}, index={}, node={}, kind={}}}",
                    group_id, command_id, index, node_id, kind
                )
            }
            Event::LeaderElection {
                group_id,
                node_id,
                term,
            } => {
                write!(
                    f,
                    "LeaderElection{{group={}, leader={}, term={}}}",
                    group_id, node_id, term
                )
            }
        }
    }
}

/// The acknowledgment continuation carried by
/// [`Event::MembershipChangeCommitted`].
///
/// It posts a thunk back onto the coordinator loop; the loop then applies the
/// conf change to the embedded Raft, adjusts the peer registry and re-submits
/// the group's remaining pending proposals.
#[derive(Debug)]
pub struct MembershipAck {
    pub(crate) group_id: GroupId,
    pub(crate) change: ConfChange,
    pub(crate) kind: MembershipChange,
    pub(crate) tx: mpsc::Sender<Callback>,
}

impl MembershipAck {
    /// Report the application's apply result. `Ok` applies the change to the
    /// embedded Raft; an error aborts it.
    pub async fn ack(self, result: Result<(), anyerror::AnyError>) {
        if let Err(err) = &result {
            warn!(
                group_id = self.group_id,
                error = display(err),
                "membership change aborted by application"
            );
        }

        let callback = Callback::ConfChangeApplied {
            group_id: self.group_id,
            change: self.change,
            kind: self.kind,
            accepted: result.is_ok(),
        };

        if self.tx.send(callback).await.is_err() {
            warn!(
                group_id = self.group_id,
                "coordinator gone; membership ack discarded"
            );
        }
    }
}
