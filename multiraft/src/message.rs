//! Wire-level message types shared by the coordinator and the transport.

use std::sync::Arc;

use raft::eraftpb::Entry;
use raft::eraftpb::EntryType;
use raft::eraftpb::Message;

use crate::command::decode_command;

/// Identifies one consensus group. A node typically participates in hundreds
/// or thousands of groups, one per data range.
pub type GroupId = u64;

/// Identifies one node. A node id is shared by every group the node is a
/// member of.
pub type NodeId = u64;

/// The group id carried by a coalesced heartbeat. It never names a real
/// group; the receiver fans the message out by peer-to-group intersection.
pub const HEARTBEAT_GROUP_ID: GroupId = u64::MAX;

/// One transport envelope: an embedded-Raft message addressed to a group.
///
/// `group_id == HEARTBEAT_GROUP_ID` marks a coalesced heartbeat or
/// heartbeat-response, in which case the group id is irrelevant.
#[derive(Clone, Debug, PartialEq)]
pub struct RaftMessageRequest {
    pub group_id: GroupId,
    pub message: Message,
}

impl RaftMessageRequest {
    pub fn new(group_id: GroupId, message: Message) -> Self {
        Self { group_id, message }
    }
}

/// Renders a command payload for diagnostics. The 16-byte command id is
/// stripped before the formatter sees the payload.
pub type EntryFormatter = Arc<dyn Fn(&[u8]) -> String + Send + Sync>;

pub(crate) fn describe_message(
    message: &Message,
    formatter: Option<&EntryFormatter>,
) -> String {
    let mut out = format!(
        "{:?} {}->{} term={} index={}",
        message.get_msg_type(),
        message.get_from(),
        message.get_to(),
        message.get_term(),
        message.get_index(),
    );

    for entry in message.get_entries().iter() {
        out.push(' ');
        out.push_str(&describe_entry(entry, formatter));
    }

    out
}

pub(crate) fn describe_entry(
    entry: &Entry,
    formatter: Option<&EntryFormatter>,
) -> String {
    let data = entry.get_data();

    let body = if data.is_empty() {
        "[empty]".to_string()
    } else if entry.get_entry_type() == EntryType::EntryNormal {
        match decode_command(data) {
            Some((command_id, command)) => match formatter {
                Some(f) => format!("{}: {}", command_id, f(&command)),
                None => format!("{}: {} bytes", command_id, command.len()),
            },
            None => format!("[malformed {} bytes]", data.len()),
        }
    } else {
        format!("[conf change {} bytes]", data.len())
    };

    format!(
        "{}/{} {:?} {}",
        entry.get_term(),
        entry.get_index(),
        entry.get_entry_type(),
        body
    )
}
