//! The transport interface the coordinator sends and receives through.

use tokio::sync::mpsc;

use crate::errors::NetworkError;
use crate::message::NodeId;
use crate::message::RaftMessageRequest;

/// Delivers inbound messages into a coordinator's bounded inbox.
///
/// A transport implementation holds one handler per listening node and calls
/// [`RaftMessageHandler::handle`] for every message addressed to it. The
/// call never blocks; when the inbox is full the message is dropped with an
/// error and the sender's Raft instance will retransmit.
#[derive(Clone, Debug)]
pub struct RaftMessageHandler {
    tx: mpsc::Sender<RaftMessageRequest>,
}

impl RaftMessageHandler {
    /// Normally created by [`MultiRaft::new`](crate::MultiRaft::new);
    /// public so transport implementations can test their delivery path.
    pub fn new(tx: mpsc::Sender<RaftMessageRequest>) -> Self {
        Self { tx }
    }

    pub fn handle(&self, req: RaftMessageRequest) -> Result<(), NetworkError> {
        self.tx.try_send(req).map_err(|e| NetworkError::new(&e))
    }
}

/// A transport carries [`RaftMessageRequest`]s between nodes.
///
/// `send` is called inline from the coordinator loop and must not block:
/// hand the message to a queue or a connection pool and report failure by
/// returning an error, which the coordinator relays to the embedded Raft as
/// an unreachability report.
pub trait Transport: Send + Sync + 'static {
    /// Register the message handler for a local node.
    fn listen(
        &self,
        node_id: NodeId,
        handler: RaftMessageHandler,
    ) -> Result<(), NetworkError>;

    /// Send one message to a remote node.
    fn send(
        &self,
        to: NodeId,
        req: RaftMessageRequest,
    ) -> Result<(), NetworkError>;

    /// Unregister a local node's handler.
    fn stop(&self, node_id: NodeId);
}
