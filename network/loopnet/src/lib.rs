//! An in-memory [`Transport`]: messages hop between coordinators of the same
//! process through their registered handlers.
//!
//! Tests use it to assemble multi-node clusters without sockets. Links can
//! be cut per node to simulate partitions, and delivered messages are
//! counted per `(from, to, type)` so coalescing behavior is observable.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;

use multiraft::NetworkError;
use multiraft::NodeId;
use multiraft::RaftMessageHandler;
use multiraft::RaftMessageRequest;
use multiraft::Transport;
use raft::eraftpb::MessageType;
use tracing::debug;

#[derive(Clone, Default)]
pub struct LoopNetwork {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    handlers: BTreeMap<NodeId, RaftMessageHandler>,
    isolated: HashSet<NodeId>,
    sent: HashMap<(NodeId, NodeId, MessageType), u64>,
}

impl LoopNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut every link touching `node_id`.
    pub fn isolate(&self, node_id: NodeId) {
        let mut inner = self.inner.lock().unwrap();
        inner.isolated.insert(node_id);
    }

    /// Restore the links of a previously isolated node.
    pub fn heal(&self, node_id: NodeId) {
        let mut inner = self.inner.lock().unwrap();
        inner.isolated.remove(&node_id);
    }

    /// Number of messages of `msg_type` delivered from `from` to `to` since
    /// the last reset. Blocked messages are not counted.
    pub fn sent_count(
        &self,
        from: NodeId,
        to: NodeId,
        msg_type: MessageType,
    ) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.sent.get(&(from, to, msg_type)).copied().unwrap_or(0)
    }

    pub fn reset_counters(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.sent.clear();
    }
}

impl Transport for LoopNetwork {
    fn listen(
        &self,
        node_id: NodeId,
        handler: RaftMessageHandler,
    ) -> Result<(), NetworkError> {
        debug!(node_id, "loopnet: listen");
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.insert(node_id, handler);
        Ok(())
    }

    fn send(
        &self,
        to: NodeId,
        req: RaftMessageRequest,
    ) -> Result<(), NetworkError> {
        let from = req.message.get_from();

        let handler = {
            let mut inner = self.inner.lock().unwrap();

            if inner.isolated.contains(&from) || inner.isolated.contains(&to)
            {
                return Err(NetworkError::new(&io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("link {}->{} is down", from, to),
                )));
            }

            let handler = inner.handlers.get(&to).cloned();
            if handler.is_some() {
                *inner
                    .sent
                    .entry((from, to, req.message.get_msg_type()))
                    .or_insert(0) += 1;
            }
            handler
        };

        let Some(handler) = handler else {
            return Err(NetworkError::new(&io::Error::new(
                io::ErrorKind::NotConnected,
                format!("no handler listening for node {}", to),
            )));
        };

        handler.handle(req)
    }

    fn stop(&self, node_id: NodeId) {
        debug!(node_id, "loopnet: stop");
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.remove(&node_id);
    }
}
