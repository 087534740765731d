//! Command identifiers and the framing that carries them through the log.
//!
//! A normal command travels as `command_id || payload`; the id prefix is
//! stripped again before the payload reaches the application. Conf-change
//! contexts carry one extra discriminant byte for the change kind, because
//! the embedded Raft's own `ConfChangeType` cannot represent a pure update.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::event::MembershipChange;

/// An opaque caller-chosen id naming one command; exactly
/// [`COMMAND_ID_LEN`] bytes.
pub type CommandId = String;

/// The exact byte length of a [`CommandId`] on the wire.
pub const COMMAND_ID_LEN: usize = 16;

/// Returns a fresh random command id.
pub fn new_command_id() -> CommandId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(COMMAND_ID_LEN)
        .map(char::from)
        .collect()
}

pub(crate) fn encode_command(command_id: &str, command: &[u8]) -> Vec<u8> {
    debug_assert_eq!(COMMAND_ID_LEN, command_id.len());

    let mut data = Vec::with_capacity(COMMAND_ID_LEN + command.len());
    data.extend_from_slice(command_id.as_bytes());
    data.extend_from_slice(command);
    data
}

/// Splits entry data back into `(command_id, payload)`. Returns `None` when
/// the data is too short to carry an id.
pub(crate) fn decode_command(data: &[u8]) -> Option<(CommandId, Vec<u8>)> {
    if data.len() < COMMAND_ID_LEN {
        return None;
    }

    let (id, command) = data.split_at(COMMAND_ID_LEN);
    let command_id = String::from_utf8_lossy(id).into_owned();
    Some((command_id, command.to_vec()))
}

pub(crate) fn encode_conf_context(
    command_id: &str,
    change: MembershipChange,
    payload: &[u8],
) -> Vec<u8> {
    debug_assert_eq!(COMMAND_ID_LEN, command_id.len());

    let mut data = Vec::with_capacity(COMMAND_ID_LEN + 1 + payload.len());
    data.extend_from_slice(command_id.as_bytes());
    data.push(change.as_byte());
    data.extend_from_slice(payload);
    data
}

pub(crate) fn decode_conf_context(
    data: &[u8],
) -> Option<(CommandId, MembershipChange, Vec<u8>)> {
    if data.len() < COMMAND_ID_LEN + 1 {
        return None;
    }

    let (id, rest) = data.split_at(COMMAND_ID_LEN);
    let command_id = String::from_utf8_lossy(id).into_owned();
    let change = MembershipChange::from_byte(rest[0])?;
    Some((command_id, change, rest[1..].to_vec()))
}
