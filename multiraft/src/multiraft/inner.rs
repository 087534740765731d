use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::base::stopper::Stopper;
use crate::base::stopper::TaskGuard;
use crate::config::Config;
use crate::core::core::Core;
use crate::core::io::api_message::CreateGroupOp;
use crate::core::io::api_message::Proposal;
use crate::core::io::api_message::RemoveGroupOp;
use crate::core::write_task::WriteTask;
use crate::errors::Error;
use crate::event::Event;
use crate::message::NodeId;
use crate::metrics::Metrics;
use crate::network::Transport;
use crate::storage::Storage;

/// The shared state behind a [`MultiRaft`](crate::MultiRaft) handle.
///
/// `core` and `write_task` are parked here between `new` and `start`.
pub(crate) struct MultiRaftInner<S, T>
where
    S: Storage,
    T: Transport,
{
    pub(crate) id: NodeId,
    pub(crate) config: Arc<Config>,

    pub(crate) tx_create: mpsc::Sender<CreateGroupOp>,
    pub(crate) tx_remove: mpsc::Sender<RemoveGroupOp>,
    pub(crate) tx_proposal: mpsc::Sender<Proposal>,
    pub(crate) tx_tick: mpsc::Sender<()>,

    pub(crate) rx_metrics: watch::Receiver<Metrics>,
    pub(crate) events: Mutex<Option<mpsc::Receiver<Event>>>,

    pub(crate) core: Mutex<Option<Core<S, T>>>,
    pub(crate) write_task: Mutex<Option<WriteTask<S>>>,
    pub(crate) stopper: Mutex<Option<Stopper>>,
}

impl<S, T> MultiRaftInner<S, T>
where
    S: Storage,
    T: Transport,
{
    /// Begin one tracked unit of work, so shutdown drains in-flight API
    /// calls instead of cutting them in half. Before `start` there is no
    /// stopper yet and ops simply queue.
    fn task_guard(&self) -> Result<Option<TaskGuard>, Error> {
        let stopper = self.stopper.lock().unwrap().clone();
        match stopper {
            Some(stopper) => {
                stopper.task().map(Some).ok_or(Error::ShuttingDown)
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn send_op<Op>(
        &self,
        tx: &mpsc::Sender<Op>,
        op: Op,
    ) -> Result<(), Error> {
        let _task = self.task_guard()?;
        tx.send(op).await.map_err(|_| Error::ShuttingDown)
    }

    pub(crate) async fn send_proposal(
        &self,
        proposal: Proposal,
    ) -> Result<(), Error> {
        let _task = self.task_guard()?;
        self.tx_proposal
            .send(proposal)
            .await
            .map_err(|_| Error::ShuttingDown)
    }
}
