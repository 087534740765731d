//! Continuations scheduled back onto the coordinator loop.

use std::fmt;

use raft::eraftpb::ConfChange;

use crate::event::MembershipChange;
use crate::message::GroupId;

/// A thunk posted by an external continuation, consumed only by the
/// coordinator. The one producer today is the membership-change ack.
pub(crate) enum Callback {
    ConfChangeApplied {
        group_id: GroupId,
        change: ConfChange,
        kind: MembershipChange,
        /// `false` when the application aborted the change.
        accepted: bool,
    },
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::ConfChangeApplied {
                group_id,
                change,
                kind,
                accepted,
            } => {
                write!(
                    f,
                    "ConfChangeApplied{{group={}, node={}, kind={}, accepted={}}}",
                    group_id,
                    change.get_node_id(),
                    kind,
                    accepted
                )
            }
        }
    }
}
