//! Public interface and wiring.
//!
//! [`MultiRaft`] is the handle to one coordinator: it is cheaply cloneable,
//! so every component of the application that needs to create groups or
//! submit commands can hold its own copy. All state lives in the coordinator
//! worker; the handle only owns channel senders.

mod inner;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;

use crate::base::stopper::Stopper;
use crate::command::CommandId;
use crate::command::COMMAND_ID_LEN;
use crate::config::Config;
use crate::config::ConfigError;
use crate::core::core::Core;
use crate::core::io::api_message::CreateGroupOp;
use crate::core::io::api_message::Proposal;
use crate::core::io::api_message::ProposalContent;
use crate::core::io::api_message::RemoveGroupOp;
use crate::core::tick::Tick;
use crate::core::write_task::WriteTask;
use crate::errors::Error;
use crate::event::Event;
use crate::event::MembershipChange;
use crate::message::EntryFormatter;
use crate::message::GroupId;
use crate::message::NodeId;
use crate::metrics::Metrics;
use crate::metrics::Wait;
use crate::multiraft::inner::MultiRaftInner;
use crate::network::RaftMessageHandler;
use crate::network::Transport;
use crate::state_machine::StateMachine;
use crate::storage::Storage;

/// Completion signal of a submitted command: fires exactly once, with `Ok`
/// on commit or an error on abort.
pub type CommitReceiver = oneshot::Receiver<Result<(), Error>>;

const CONTROL_QUEUE_LEN: usize = 100;
const EVENT_QUEUE_LEN: usize = 1000;

/// A local node multiplexing many Raft consensus groups.
///
/// The owner is responsible for consuming the event stream
/// ([`take_events`](MultiRaft::take_events)) in a timely manner.
pub struct MultiRaft<S, T>
where
    S: Storage,
    T: Transport,
{
    inner: Arc<MultiRaftInner<S, T>>,
}

impl<S, T> Clone for MultiRaft<S, T>
where
    S: Storage,
    T: Transport,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, T> MultiRaft<S, T>
where
    S: Storage,
    T: Transport,
{
    /// Builds a coordinator and registers its message handler with the
    /// transport. Nothing runs until [`start`](MultiRaft::start).
    pub fn new(
        id: NodeId,
        config: Arc<Config>,
        transport: T,
        storage: S,
    ) -> Result<Self, Error> {
        if id == raft::INVALID_ID {
            return Err(Error::Config(ConfigError::InvalidNodeId));
        }
        config.verify()?;

        let (tx_message, rx_message) = mpsc::channel(CONTROL_QUEUE_LEN);
        let (tx_create, rx_create) = mpsc::channel(CONTROL_QUEUE_LEN);
        let (tx_remove, rx_remove) = mpsc::channel(CONTROL_QUEUE_LEN);
        let (tx_proposal, rx_proposal) = mpsc::channel(CONTROL_QUEUE_LEN);
        let (tx_callback, rx_callback) = mpsc::channel(CONTROL_QUEUE_LEN);
        let (tx_tick, rx_tick) = mpsc::channel(CONTROL_QUEUE_LEN);
        let (tx_event, rx_event) = mpsc::channel(EVENT_QUEUE_LEN);

        // The write pipeline allows one request in flight at a time.
        let (tx_write, rx_write) = mpsc::channel(1);
        let (tx_write_ready, rx_write_ready) = mpsc::channel(1);
        let (tx_write_done, rx_write_done) = mpsc::channel(1);

        let (tx_metrics, rx_metrics) =
            watch::channel(Metrics::new_initial(id));

        let storage = Arc::new(storage);
        let transport = Arc::new(transport);

        transport.listen(id, RaftMessageHandler::new(tx_message))?;

        let write_task = WriteTask {
            storage: storage.clone(),
            rx_request: rx_write,
            tx_ready: tx_write_ready,
            tx_done: tx_write_done,
        };

        let core = Core {
            id,
            config: config.clone(),
            storage,
            transport: transport.clone(),
            state_machine: None,
            entry_formatter: None,
            raft_logger: slog::Logger::root(slog::Discard, slog::o!()),
            groups: HashMap::new(),
            peers: HashMap::new(),
            dirty: BTreeSet::new(),
            ready_groups: None,
            writing_groups: None,
            ticks: 0,
            rx_message,
            rx_create,
            rx_remove,
            rx_proposal,
            tx_proposal: tx_proposal.clone(),
            rx_callback,
            tx_callback,
            rx_tick,
            tx_event,
            tx_write,
            rx_write_ready,
            rx_write_done,
            tx_metrics,
            metrics_changed: false,
        };

        let inner = MultiRaftInner {
            id,
            config,
            tx_create,
            tx_remove,
            tx_proposal,
            tx_tick,
            rx_metrics,
            events: Mutex::new(Some(rx_event)),
            core: Mutex::new(Some(core)),
            write_task: Mutex::new(Some(write_task)),
            stopper: Mutex::new(None),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Attach a state machine for applied-index recovery. Must be called
    /// before [`start`](MultiRaft::start).
    pub fn with_state_machine(self, state_machine: Arc<dyn StateMachine>) -> Self {
        if let Some(core) = self.inner.core.lock().unwrap().as_mut() {
            core.state_machine = Some(state_machine);
        }
        self
    }

    /// Attach a diagnostic formatter for command payloads. Must be called
    /// before [`start`](MultiRaft::start).
    pub fn with_entry_formatter(self, formatter: EntryFormatter) -> Self {
        if let Some(core) = self.inner.core.lock().unwrap().as_mut() {
            core.entry_formatter = Some(formatter);
        }
        self
    }

    /// Runs the coordinator, the write task and (unless disabled) the tick
    /// worker under the given stopper.
    pub fn start(&self, stopper: &Stopper) {
        let Some(core) = self.inner.core.lock().unwrap().take() else {
            debug!(id = self.inner.id, "start called twice; ignoring");
            return;
        };
        let Some(write_task) = self.inner.write_task.lock().unwrap().take()
        else {
            return;
        };

        *self.inner.stopper.lock().unwrap() = Some(stopper.clone());

        stopper.run_worker(write_task.run(stopper.should_stop()));
        stopper.run_worker(core.main(stopper.should_stop()));

        if self.inner.config.enable_tick {
            Tick::spawn(
                self.inner.config.tick_interval(),
                self.inner.tx_tick.clone(),
                stopper,
            );
        }
    }

    /// Creates a consensus group and joins it. The initial membership comes
    /// from the group storage's `initial_state`. Idempotent.
    pub async fn create_group(&self, group_id: GroupId) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .send_op(&self.inner.tx_create, CreateGroupOp { group_id, tx })
            .await?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Destroys a consensus group. No events for the group are emitted after
    /// this returns, though some may still sit in the stream buffer.
    /// Idempotent.
    pub async fn remove_group(&self, group_id: GroupId) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .send_op(&self.inner.tx_remove, RemoveGroupOp { group_id, tx })
            .await?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Submits a command and waits for its commit (or abort).
    pub async fn submit_command(
        &self,
        group_id: GroupId,
        command_id: CommandId,
        command: Vec<u8>,
    ) -> Result<(), Error> {
        let rx =
            self.submit_command_ff(group_id, command_id, command).await?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Submits a command and returns as soon as it is queued; the receiver
    /// fires on commit or abort. `_ff` is fire-and-forget.
    pub async fn submit_command_ff(
        &self,
        group_id: GroupId,
        command_id: CommandId,
        command: Vec<u8>,
    ) -> Result<CommitReceiver, Error> {
        Self::check_command_id(&command_id)?;

        debug!(
            id = self.inner.id,
            group_id,
            command_id = display(&command_id),
            "submitting command"
        );

        let (tx, rx) = oneshot::channel();
        self.inner
            .send_proposal(Proposal {
                group_id,
                command_id,
                content: ProposalContent::Normal { command },
                tx: Some(tx),
            })
            .await?;
        Ok(rx)
    }

    /// Proposes a membership change and waits for its commit. The payload is
    /// opaque and comes back in the resulting event.
    pub async fn change_group_membership(
        &self,
        group_id: GroupId,
        command_id: CommandId,
        change: MembershipChange,
        node_id: NodeId,
        payload: Vec<u8>,
    ) -> Result<(), Error> {
        let rx = self
            .change_group_membership_ff(
                group_id, command_id, change, node_id, payload,
            )
            .await?;
        rx.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Fire-and-forget form of
    /// [`change_group_membership`](MultiRaft::change_group_membership).
    pub async fn change_group_membership_ff(
        &self,
        group_id: GroupId,
        command_id: CommandId,
        change: MembershipChange,
        node_id: NodeId,
        payload: Vec<u8>,
    ) -> Result<CommitReceiver, Error> {
        Self::check_command_id(&command_id)?;

        debug!(
            id = self.inner.id,
            group_id,
            command_id = display(&command_id),
            change = display(change),
            node_id,
            "proposing membership change"
        );

        let (tx, rx) = oneshot::channel();
        self.inner
            .send_proposal(Proposal {
                group_id,
                command_id,
                content: ProposalContent::ConfChange {
                    change,
                    node_id,
                    payload,
                },
                tx: Some(tx),
            })
            .await?;
        Ok(rx)
    }

    /// Takes the event stream. Yields `None` after the first call.
    pub fn take_events(&self) -> Option<mpsc::Receiver<Event>> {
        self.inner.events.lock().unwrap().take()
    }

    /// Injects one logical tick. With `enable_tick = false` this is how
    /// tests drive heartbeat and election timers deterministically.
    pub async fn tick(&self) -> Result<(), Error> {
        self.inner
            .tx_tick
            .send(())
            .await
            .map_err(|_| Error::ShuttingDown)
    }

    /// A handle to the metrics channel.
    pub fn metrics(&self) -> watch::Receiver<Metrics> {
        self.inner.rx_metrics.clone()
    }

    /// A handle to wait for the metrics to satisfy some condition.
    ///
    /// With `timeout` of `None` it waits practically forever.
    pub fn wait(&self, timeout: Option<Duration>) -> Wait {
        let timeout = timeout.unwrap_or(Duration::from_secs(86400 * 365));
        Wait {
            timeout,
            rx: self.inner.rx_metrics.clone(),
        }
    }

    /// The config of this node.
    pub fn config(&self) -> &Arc<Config> {
        &self.inner.config
    }

    /// This node's id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Last-known leaders, keyed by group.
    pub fn leaders(&self) -> BTreeMap<GroupId, NodeId> {
        self.inner.rx_metrics.borrow().leaders.clone()
    }

    fn check_command_id(command_id: &CommandId) -> Result<(), Error> {
        if command_id.len() != COMMAND_ID_LEN {
            return Err(Error::InvalidCommandId {
                expected: COMMAND_ID_LEN,
                got: command_id.len(),
            });
        }
        Ok(())
    }
}
