//! Per-group and per-peer soft state.

use std::collections::HashMap;
use std::collections::HashSet;

use raft::RawNode;

use crate::command::CommandId;
use crate::core::io::api_message::Proposal;
use crate::message::GroupId;
use crate::message::NodeId;
use crate::storage::GroupStorage;

/// The state of one consensus group on this node.
///
/// Everything here is owned by the coordinator loop; no synchronization.
pub(crate) struct Group<GS: GroupStorage> {
    pub(crate) raw_node: RawNode<GS>,

    /// The write task needs its own handle to the same underlying store.
    pub(crate) storage: GS,

    /// Term of the most recently committed entry; only ever advances.
    pub(crate) committed_term: u64,

    /// Last-known leader of this group, or 0 while an election is in
    /// progress.
    pub(crate) leader: NodeId,

    /// Commands proposed but not yet committed in the current term. When a
    /// proposal commits, its completion sender is taken and the record
    /// removed.
    pub(crate) pending: HashMap<CommandId, Proposal>,

    /// True between a committed membership change and the application's
    /// acknowledgment. While set, further conf-change proposals stay parked
    /// in `pending`.
    pub(crate) waiting_conf_ack: bool,
}

impl<GS: GroupStorage> Group<GS> {
    pub(crate) fn new(raw_node: RawNode<GS>, storage: GS) -> Self {
        Self {
            raw_node,
            storage,
            committed_term: 0,
            leader: raft::INVALID_ID,
            pending: HashMap::new(),
            waiting_conf_ack: false,
        }
    }
}

/// The connection-level record for a remote node: which of our groups it
/// overlaps with. Coalesced heartbeat fan-out is driven entirely by this set.
pub(crate) struct Peer {
    pub(crate) node_id: NodeId,
    pub(crate) group_ids: HashSet<GroupId>,
}

impl Peer {
    pub(crate) fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            group_ids: HashSet::new(),
        }
    }

    pub(crate) fn register_group(&mut self, group_id: GroupId) {
        self.group_ids.insert(group_id);
    }

    pub(crate) fn unregister_group(&mut self, group_id: GroupId) {
        self.group_ids.remove(&group_id);
    }
}
