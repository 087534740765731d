//! Coalesced heartbeats.
//!
//! When groups vastly outnumber peers, per-group heartbeats dominate the
//! wire. The coordinator instead emits one heartbeat per peer per interval,
//! carrying a sentinel group id, and the receiver fans it out locally to
//! every group the two nodes share. Per-group heartbeats produced by the
//! embedded Rafts are dropped at send time, and per-group responses are
//! deduplicated to one per peer per cycle.
//!
//! For each (leader, follower) pair of every group this preserves the
//! embedded Raft's liveness contract: under a healthy transport each side
//! observes a heartbeat or response at least once per interval, while only
//! one wire message per direction crosses the link.

use raft::eraftpb::Message;
use raft::eraftpb::MessageType;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::core::core::Core;
use crate::message::GroupId;
use crate::message::NodeId;
use crate::message::RaftMessageRequest;
use crate::message::HEARTBEAT_GROUP_ID;
use crate::network::Transport;
use crate::storage::Storage;

impl<S, T> Core<S, T>
where
    S: Storage,
    T: Transport,
{
    /// Emits one heartbeat to every registered peer. Runs every
    /// `heartbeat_interval_ticks` logical ticks.
    pub(crate) fn coalesced_heartbeat(&mut self) {
        for to in self.peer_ids() {
            // Don't heartbeat yourself.
            if to == self.id {
                continue;
            }

            debug!(id = self.id, to, "triggering coalesced heartbeat");

            let mut message = Message::default();
            message.set_msg_type(MessageType::MsgHeartbeat);
            message.set_from(self.id);
            message.set_to(to);

            if let Err(err) = self
                .transport
                .send(to, RaftMessageRequest::new(HEARTBEAT_GROUP_ID, message))
            {
                error!(
                    id = self.id,
                    to,
                    error = display(&err),
                    "error sending coalesced heartbeat"
                );
            }
        }
    }

    /// Fans an inbound coalesced heartbeat out to every overlap group that
    /// believes the sender is its leader.
    pub(crate) fn fanout_heartbeat(&mut self, req: &RaftMessageRequest) {
        let from = req.message.get_from();

        let Some(overlap) = self.overlap_groups(from) else {
            // A leader only begins recovery for a follower once that
            // follower has answered a heartbeat, so an unknown sender still
            // gets a bare response to restart its recovery timer.
            warn!(
                id = self.id,
                from,
                "not fanning out heartbeat from unknown peer (but responding anyway)"
            );

            let mut message = Message::default();
            message.set_msg_type(MessageType::MsgHeartbeatResponse);
            message.set_from(self.id);
            message.set_to(from);

            if let Err(err) = self.transport.send(
                from,
                RaftMessageRequest::new(HEARTBEAT_GROUP_ID, message),
            ) {
                error!(
                    id = self.id,
                    from,
                    error = display(&err),
                    "error sending heartbeat response"
                );
            }
            return;
        };

        let total = overlap.len();
        let mut fanned = 0;
        for group_id in overlap {
            let leader = match self.groups.get(&group_id) {
                Some(group) => group.leader,
                None => continue,
            };
            // Don't propagate into groups that don't follow the sender.
            if leader != from || from == self.id {
                continue;
            }

            self.step_group(group_id, req.message.clone());
            fanned += 1;
        }

        debug!(
            id = self.id,
            from, fanned, total, "fanned out coalesced heartbeat"
        );
    }

    /// Fans an inbound coalesced heartbeat response out to every overlap
    /// group in which we are the leader.
    pub(crate) fn fanout_heartbeat_response(
        &mut self,
        req: &RaftMessageRequest,
    ) {
        let from = req.message.get_from();

        let Some(overlap) = self.overlap_groups(from) else {
            warn!(
                id = self.id,
                from,
                "not fanning out heartbeat response from unknown peer"
            );
            return;
        };

        let total = overlap.len();
        let mut fanned = 0;
        for group_id in overlap {
            let leader = match self.groups.get(&group_id) {
                Some(group) => group.leader,
                None => continue,
            };
            // Only a leader consumes heartbeat responses.
            if leader != self.id || from == self.id {
                continue;
            }

            self.step_group(group_id, req.message.clone());
            fanned += 1;
        }

        debug!(
            id = self.id,
            from, fanned, total, "fanned out coalesced heartbeat response"
        );
    }

    fn peer_ids(&self) -> Vec<NodeId> {
        self.peers.values().map(|peer| peer.node_id).collect()
    }

    fn overlap_groups(&self, node_id: NodeId) -> Option<Vec<GroupId>> {
        let peer = self.peers.get(&node_id)?;
        Some(peer.group_ids.iter().copied().collect())
    }
}
