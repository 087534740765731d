//! Messages sent by the application handle to the coordinator loop.

use std::fmt;

use tokio::sync::oneshot;

use crate::command::CommandId;
use crate::errors::Error;
use crate::event::MembershipChange;
use crate::message::GroupId;
use crate::message::NodeId;

pub(crate) struct CreateGroupOp {
    pub group_id: GroupId,
    pub tx: oneshot::Sender<Result<(), Error>>,
}

pub(crate) struct RemoveGroupOp {
    pub group_id: GroupId,
    pub tx: oneshot::Sender<Result<(), Error>>,
}

/// A pending application request.
///
/// A fresh proposal carries the completion sender; a re-proposal after a
/// leader change or membership ack travels the same channel with `tx: None`,
/// and the original record in the group's pending table keeps the sender.
pub(crate) struct Proposal {
    pub group_id: GroupId,
    pub command_id: CommandId,
    pub content: ProposalContent,
    pub tx: Option<oneshot::Sender<Result<(), Error>>>,
}

impl Proposal {
    /// A re-submission of an already-pending proposal.
    pub(crate) fn requeued(&self) -> Proposal {
        Proposal {
            group_id: self.group_id,
            command_id: self.command_id.clone(),
            content: self.content.clone(),
            tx: None,
        }
    }
}

#[derive(Clone)]
pub(crate) enum ProposalContent {
    Normal {
        command: Vec<u8>,
    },
    ConfChange {
        change: MembershipChange,
        node_id: NodeId,
        payload: Vec<u8>,
    },
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.content {
            ProposalContent::Normal { command } => {
                format!("Normal({} bytes)", command.len())
            }
            ProposalContent::ConfChange {
                change, node_id, ..
            } => {
                format!("ConfChange({} node {})", change, node_id)
            }
        };
        write!(
            f,
            "Proposal{{group={}, command_id={}, {}, requeued={}}}",
            self.group_id,
            self.command_id,
            kind,
            self.tx.is_none()
        )
    }
}
