use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use anyerror::AnyError;
use protobuf::Message as PbMessage;
use raft::eraftpb::ConfChange;
use raft::eraftpb::Entry;
use raft::eraftpb::EntryType;
use raft::eraftpb::Message;
use raft::eraftpb::MessageType;
use raft::eraftpb::Snapshot;
use raft::RawNode;
use raft::Ready;
use raft::SnapshotStatus;
use raft::Storage as _;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::command::decode_command;
use crate::command::decode_conf_context;
use crate::command::encode_command;
use crate::command::encode_conf_context;
use crate::command::CommandId;
use crate::config::Config;
use crate::core::group::Group;
use crate::core::group::Peer;
use crate::core::io::api_message::CreateGroupOp;
use crate::core::io::api_message::Proposal;
use crate::core::io::api_message::ProposalContent;
use crate::core::io::api_message::RemoveGroupOp;
use crate::core::io::callback::Callback;
use crate::core::write_task::GroupWriteRequest;
use crate::core::write_task::WriteDone;
use crate::core::write_task::WriteRequest;
use crate::errors::Error;
use crate::errors::Fatal;
use crate::event::Event;
use crate::event::MembershipAck;
use crate::event::MembershipChange;
use crate::message::describe_entry;
use crate::message::describe_message;
use crate::message::EntryFormatter;
use crate::message::GroupId;
use crate::message::NodeId;
use crate::message::RaftMessageRequest;
use crate::metrics::Metrics;
use crate::state_machine::StateMachine;
use crate::network::Transport;
use crate::storage::GroupStorage;
use crate::storage::Storage;

/// The coordinator. One long-running task owns all of this; per-group and
/// per-peer state needs no locks.
pub(crate) struct Core<S, T>
where
    S: Storage,
    T: Transport,
{
    pub(crate) id: NodeId,
    pub(crate) config: Arc<Config>,
    pub(crate) storage: Arc<S>,
    pub(crate) transport: Arc<T>,
    pub(crate) state_machine: Option<Arc<dyn StateMachine>>,
    pub(crate) entry_formatter: Option<EntryFormatter>,

    /// Logger handed to each embedded Raft instance.
    pub(crate) raft_logger: slog::Logger,

    pub(crate) groups: HashMap<GroupId, Group<S::GroupStorage>>,
    pub(crate) peers: HashMap<NodeId, Peer>,

    /// Groups touched since the last ready collection: stepped, ticked,
    /// proposed into, or advanced. Only these are polled for readiness.
    pub(crate) dirty: BTreeSet<GroupId>,

    /// Pipeline stash: a collected ready batch waiting for the write task.
    pub(crate) ready_groups: Option<HashMap<GroupId, Ready>>,
    /// Pipeline in-flight slot: the batch whose durability is unresolved.
    pub(crate) writing_groups: Option<HashMap<GroupId, Ready>>,

    /// Counts up to the heartbeat interval, then resets.
    pub(crate) ticks: usize,

    pub(crate) rx_message: mpsc::Receiver<RaftMessageRequest>,
    pub(crate) rx_create: mpsc::Receiver<CreateGroupOp>,
    pub(crate) rx_remove: mpsc::Receiver<RemoveGroupOp>,
    pub(crate) rx_proposal: mpsc::Receiver<Proposal>,
    pub(crate) tx_proposal: mpsc::Sender<Proposal>,
    pub(crate) rx_callback: mpsc::Receiver<Callback>,
    pub(crate) tx_callback: mpsc::Sender<Callback>,
    pub(crate) rx_tick: mpsc::Receiver<()>,

    pub(crate) tx_event: mpsc::Sender<Event>,

    pub(crate) tx_write: mpsc::Sender<WriteRequest>,
    pub(crate) rx_write_ready: mpsc::Receiver<()>,
    pub(crate) rx_write_done: mpsc::Receiver<Result<WriteDone, AnyError>>,

    pub(crate) tx_metrics: watch::Sender<Metrics>,
    pub(crate) metrics_changed: bool,
}

impl<S, T> Core<S, T>
where
    S: Storage,
    T: Transport,
{
    /// The main loop of the coordinator worker.
    pub(crate) async fn main(mut self, stop_rx: watch::Receiver<bool>) {
        info!(id = self.id, "multiraft node starting");

        let res = self.runtime_loop(stop_rx).await;

        let terminal = match res {
            Ok(()) => {
                info!(id = self.id, "multiraft node stopped");
                Fatal::Stopped
            }
            Err(err) => {
                error!(
                    id = self.id,
                    error = display(&err),
                    "multiraft node quit on error"
                );
                err
            }
        };

        self.tx_metrics.send_modify(|m| {
            m.running_state = Err(terminal);
        });
    }

    async fn runtime_loop(
        &mut self,
        mut stop_rx: watch::Receiver<bool>,
    ) -> Result<(), Fatal> {
        // The stop signal may predate this worker.
        if *stop_rx.borrow() {
            self.drain_on_stop();
            return Ok(());
        }

        loop {
            // The pipeline state machine: only ask the embedded Rafts for new
            // work while no batch is stashed and none is being written.
            if self.ready_groups.is_none() && self.writing_groups.is_none() {
                self.collect_ready();
            }
            let write_ready_armed = self.ready_groups.is_some();

            tokio::select! {
                _ = stop_rx.changed() => {
                    self.drain_on_stop();
                    return Ok(());
                }

                Some(req) = self.rx_message.recv() => {
                    self.handle_raft_message(req);
                }

                Some(op) = self.rx_create.recv() => {
                    debug!(id = self.id, group_id = op.group_id, "create group op");
                    let res = self.create_group(op.group_id);
                    let _ = op.tx.send(res);
                }

                Some(op) = self.rx_remove.recv() => {
                    debug!(id = self.id, group_id = op.group_id, "remove group op");
                    self.remove_group(op);
                }

                Some(proposal) = self.rx_proposal.recv() => {
                    self.dispatch_proposal(proposal);
                }

                Some(()) = self.rx_write_ready.recv(), if write_ready_armed => {
                    if let Some(mut batch) = self.ready_groups.take() {
                        self.submit_write(&mut batch).await?;
                        self.writing_groups = Some(batch);
                    }
                }

                Some(result) = self.rx_write_done.recv() => {
                    let done = result.map_err(Fatal::StorageError)?;
                    debug!(id = self.id, groups = done.groups.len(), "write done");
                    match self.writing_groups.take() {
                        Some(batch) => self.handle_write_done(batch)?,
                        None => self.strict_error(
                            "write response without an in-flight request".to_string(),
                        ),
                    }
                }

                Some(()) = self.rx_tick.recv() => {
                    self.handle_tick();
                }

                Some(callback) = self.rx_callback.recv() => {
                    debug!(id = self.id, callback = display(&callback), "callback");
                    self.handle_callback(callback);
                }

                else => {
                    info!(id = self.id, "all input channels closed");
                    return Ok(());
                }
            }

            self.report_metrics();
        }
    }

    fn collect_ready(&mut self) {
        if self.dirty.is_empty() {
            return;
        }

        let mut batch = HashMap::new();
        for group_id in std::mem::take(&mut self.dirty) {
            let Some(group) = self.groups.get_mut(&group_id) else {
                continue;
            };
            if !group.raw_node.has_ready() {
                continue;
            }
            batch.insert(group_id, group.raw_node.ready());
        }

        if batch.is_empty() {
            return;
        }

        self.log_raft_ready(&batch);
        self.ready_groups = Some(batch);
    }

    async fn submit_write(
        &mut self,
        batch: &mut HashMap<GroupId, Ready>,
    ) -> Result<(), Fatal> {
        let mut request = WriteRequest::default();

        for (group_id, ready) in batch.iter_mut() {
            let mut w = GroupWriteRequest::default();
            if let Some(hard_state) = ready.hs() {
                w.hard_state = Some(hard_state.clone());
            }
            if *ready.snapshot() != Snapshot::default() {
                w.snapshot = Some(ready.snapshot().clone());
            }
            let entries = ready.take_entries();
            if !entries.is_empty() {
                w.entries = entries;
            }
            request.groups.insert(*group_id, w);
        }

        debug!(id = self.id, groups = request.groups.len(), "submitting write");

        // The write task has just signalled idle, so this cannot block for
        // long; an error means it is gone and the loop should stop too.
        self.tx_write.send(request).await.map_err(|_| Fatal::Stopped)
    }

    fn handle_write_done(
        &mut self,
        batch: HashMap<GroupId, Ready>,
    ) -> Result<(), Fatal> {
        // One heartbeat response per peer per cycle, across all groups.
        let mut responded: HashSet<NodeId> = HashSet::new();

        for (group_id, mut ready) in batch {
            if !self.groups.contains_key(&group_id) {
                debug!(group_id, "dropping stale write to removed group");
                continue;
            }

            let soft_leader = ready.ss().map(|ss| ss.leader_id);

            let mut committed = ready.take_committed_entries();
            let mut messages = ready.take_messages();
            messages.extend(ready.take_persisted_messages());

            // Everything in the batch is stable on disk; let the group move
            // on and pick up what became committed by this persistence.
            let (light_messages, light_committed) = {
                let Some(group) = self.groups.get_mut(&group_id) else {
                    continue;
                };
                let mut light = group.raw_node.advance(ready);
                let light_messages = light.take_messages();
                let light_committed = light.take_committed_entries();
                group.raw_node.advance_apply();
                (light_messages, light_committed)
            };
            committed.extend(light_committed);
            messages.extend(light_messages);

            let last_committed_term = committed.last().map(|e| e.get_term());

            for entry in committed {
                if let Some(command_id) =
                    self.apply_committed_entry(group_id, entry)?
                {
                    self.complete_proposal(group_id, &command_id);
                }
            }

            self.maybe_emit_leader_event(
                group_id,
                soft_leader,
                last_committed_term,
            );

            self.send_group_messages(group_id, messages, &mut responded);

            self.dirty.insert(group_id);
        }

        Ok(())
    }

    /// Tells the application that an entry was committed. Returns the command
    /// id, or `None` if the entry was not a command.
    fn apply_committed_entry(
        &mut self,
        group_id: GroupId,
        entry: Entry,
    ) -> Result<Option<CommandId>, Fatal> {
        match entry.get_entry_type() {
            EntryType::EntryNormal => {
                // The embedded Raft adds an empty entry upon election;
                // ignore those.
                if entry.get_data().is_empty() {
                    return Ok(None);
                }

                let Some((command_id, payload)) =
                    decode_command(entry.get_data())
                else {
                    self.strict_error(format!(
                        "group {}: committed entry too short for a command id",
                        group_id
                    ));
                    return Ok(None);
                };

                self.send_event(Event::CommandCommitted {
                    group_id,
                    command_id: command_id.clone(),
                    payload,
                    index: entry.get_index(),
                });

                Ok(Some(command_id))
            }

            EntryType::EntryConfChange => {
                let mut change = ConfChange::default();
                change.merge_from_bytes(entry.get_data()).map_err(|e| {
                    Fatal::InvariantViolation(AnyError::error(format!(
                        "invalid conf change data: {}",
                        e
                    )))
                })?;

                let context = change.get_context();
                let (command_id, kind, payload) = if context.is_empty() {
                    // A change proposed by a foreign implementation; fall
                    // back to the wire-level kind.
                    (
                        CommandId::new(),
                        MembershipChange::from_conf_change_type(
                            change.get_change_type(),
                        ),
                        Vec::new(),
                    )
                } else {
                    match decode_conf_context(context) {
                        Some(decoded) => decoded,
                        None => {
                            return Err(Fatal::InvariantViolation(
                                AnyError::error(format!(
                                    "group {}: undecodable conf change context",
                                    group_id
                                )),
                            ))
                        }
                    }
                };

                if let Some(group) = self.groups.get_mut(&group_id) {
                    group.waiting_conf_ack = true;
                }

                let ack = MembershipAck {
                    group_id,
                    change: change.clone(),
                    kind,
                    tx: self.tx_callback.clone(),
                };

                self.send_event(Event::MembershipChangeCommitted {
                    group_id,
                    command_id: command_id.clone(),
                    index: entry.get_index(),
                    node_id: change.get_node_id(),
                    kind,
                    payload,
                    ack,
                });

                if command_id.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(command_id))
                }
            }

            EntryType::EntryConfChangeV2 => {
                self.strict_error(format!(
                    "group {}: unexpected joint conf change entry",
                    group_id
                ));
                Ok(None)
            }
        }
    }

    fn complete_proposal(&mut self, group_id: GroupId, command_id: &CommandId) {
        let Some(group) = self.groups.get_mut(&group_id) else {
            return;
        };
        if let Some(mut proposal) = group.pending.remove(command_id) {
            // Re-queuing during leadership changes can finish the same
            // proposal twice; taking the sender keeps the signal single-shot.
            if let Some(tx) = proposal.tx.take() {
                let _ = tx.send(Ok(()));
            }
        }
    }

    /// Records leadership changes from a ready batch and, when the committed
    /// term advanced under a known leader, emits an election event and
    /// retries the group's pending proposals (the previous leader may have
    /// dropped them).
    fn maybe_emit_leader_event(
        &mut self,
        group_id: GroupId,
        soft_leader: Option<NodeId>,
        last_committed_term: Option<u64>,
    ) {
        let emit = {
            let Some(group) = self.groups.get_mut(&group_id) else {
                return;
            };

            if let Some(leader) = soft_leader {
                group.leader = leader;
                self.metrics_changed = true;
            }

            let term = last_committed_term.unwrap_or(group.committed_term);

            if term != group.committed_term && group.leader != raft::INVALID_ID
            {
                group.committed_term = term;
                Some((group.leader, term))
            } else {
                None
            }
        };

        if let Some((leader, term)) = emit {
            self.send_event(Event::LeaderElection {
                group_id,
                node_id: leader,
                term,
            });
            self.requeue_pending(group_id);
        }
    }

    fn handle_raft_message(&mut self, req: RaftMessageRequest) {
        debug!(
            id = self.id,
            group_id = req.group_id,
            message = display(describe_message(
                &req.message,
                self.entry_formatter.as_ref()
            )),
            "inbound message"
        );

        match req.message.get_msg_type() {
            MessageType::MsgHeartbeat => self.fanout_heartbeat(&req),
            MessageType::MsgHeartbeatResponse => {
                self.fanout_heartbeat_response(&req)
            }
            _ => {
                // Only non-heartbeat traffic creates groups lazily; coalesced
                // heartbeats carry a sentinel group id.
                let group_id = req.group_id;
                if !self.groups.contains_key(&group_id) {
                    info!(
                        id = self.id,
                        group_id,
                        "got message for unknown group; creating it"
                    );
                    if let Err(err) = self.create_group(group_id) {
                        warn!(
                            group_id,
                            error = display(&err),
                            "error creating group"
                        );
                        return;
                    }
                }
                self.step_group(group_id, req.message);
            }
        }
    }

    pub(crate) fn step_group(&mut self, group_id: GroupId, message: Message) {
        let Some(group) = self.groups.get_mut(&group_id) else {
            return;
        };
        if let Err(err) = group.raw_node.step(message) {
            debug!(
                id = self.id,
                group_id,
                error = display(&err),
                "step failed"
            );
        }
        self.dirty.insert(group_id);
    }

    /// Creates a consensus group and joins it. The initial membership comes
    /// from the storage's `initial_state`. Idempotent.
    fn create_group(&mut self, group_id: GroupId) -> Result<(), Error> {
        if self.groups.contains_key(&group_id) {
            return Ok(());
        }

        debug!(id = self.id, group_id, "creating group");

        let group_storage = self
            .storage
            .group_storage(group_id)
            .map_err(|e| Error::storage(&e))?;

        let initial_state =
            group_storage.initial_state().map_err(|e| Error::raft(&e))?;
        let conf_state = initial_state.conf_state;

        let applied = match &self.state_machine {
            Some(sm) => sm
                .applied_index(group_id)
                .map_err(|e| Error::storage(&e))?,
            None => 0,
        };

        let raft_config = raft::Config {
            id: self.id,
            election_tick: self.config.election_timeout_ticks,
            heartbeat_tick: self.config.heartbeat_interval_ticks,
            applied,
            max_size_per_msg: self.config.max_size_per_msg,
            max_inflight_msgs: self.config.max_inflight_msgs,
            ..Default::default()
        };

        let raw_node = RawNode::new(
            &raft_config,
            group_storage.clone(),
            &self.raft_logger,
        )
        .map_err(|e| Error::raft(&e))?;

        self.groups
            .insert(group_id, Group::new(raw_node, group_storage));
        self.metrics_changed = true;

        let voters = conf_state.get_voters().to_vec();
        let learners = conf_state.get_learners().to_vec();
        for node_id in voters.iter().chain(learners.iter()) {
            self.add_peer(*node_id, group_id)?;
        }

        // A group with exactly one member, us, campaigns immediately rather
        // than sitting out a pointless election timeout.
        if voters.len() == 1 && voters[0] == self.id && learners.is_empty() {
            if let Some(group) = self.groups.get_mut(&group_id) {
                if let Err(err) = group.raw_node.campaign() {
                    warn!(
                        group_id,
                        error = display(&err),
                        "single-node campaign failed"
                    );
                }
            }
            self.dirty.insert(group_id);
        }

        Ok(())
    }

    /// Destroys a consensus group. Creation is lazy and idempotent; so is
    /// removal. Pending proposals are failed rather than leaked.
    fn remove_group(&mut self, op: RemoveGroupOp) {
        let Some(mut group) = self.groups.remove(&op.group_id) else {
            let _ = op.tx.send(Ok(()));
            return;
        };

        for (_, mut proposal) in group.pending.drain() {
            if let Some(tx) = proposal.tx.take() {
                let _ = tx.send(Err(Error::GroupNotFound(op.group_id)));
            }
        }

        self.unregister_group_from_peers(op.group_id);
        self.dirty.remove(&op.group_id);
        self.metrics_changed = true;

        let _ = op.tx.send(Ok(()));
    }

    /// Registers `group_id` with the peer record for `node_id`, creating the
    /// record on first contact.
    pub(crate) fn add_peer(
        &mut self,
        node_id: NodeId,
        group_id: GroupId,
    ) -> Result<(), Error> {
        if !self.groups.contains_key(&group_id) {
            return Err(Error::GroupNotFound(group_id));
        }

        let peer = self
            .peers
            .entry(node_id)
            .or_insert_with(|| Peer::new(node_id));
        peer.register_group(group_id);
        Ok(())
    }

    /// Drops `group_id` from every peer; peers left without any overlap group
    /// are forgotten entirely, which also stops heartbeats to them.
    fn unregister_group_from_peers(&mut self, group_id: GroupId) {
        self.peers.retain(|_, peer| {
            peer.unregister_group(group_id);
            !peer.group_ids.is_empty()
        });
    }

    pub(crate) fn remove_peer_from_group(
        &mut self,
        node_id: NodeId,
        group_id: GroupId,
    ) {
        if let Some(peer) = self.peers.get_mut(&node_id) {
            peer.unregister_group(group_id);
            if peer.group_ids.is_empty() {
                self.peers.remove(&node_id);
            }
        }
    }

    fn dispatch_proposal(&mut self, mut proposal: Proposal) {
        debug!(id = self.id, proposal = display(&proposal), "proposal");

        let group_id = proposal.group_id;
        let command_id = proposal.command_id.clone();
        let content = proposal.content.clone();
        let is_conf_change =
            matches!(content, ProposalContent::ConfChange { .. });

        {
            let Some(group) = self.groups.get_mut(&group_id) else {
                // tx is None when the command was re-proposed due to a
                // leadership change but finished before it was drained from
                // the proposal queue.
                if let Some(tx) = proposal.tx.take() {
                    let _ = tx.send(Err(Error::GroupNotFound(group_id)));
                }
                return;
            };

            if !group.pending.contains_key(&command_id) {
                if proposal.tx.is_none() {
                    // A re-proposal of a command that already completed.
                    return;
                }
                group.pending.insert(command_id.clone(), proposal);
            }

            if is_conf_change && group.waiting_conf_ack {
                // One membership change at a time: parked in `pending`, and
                // re-submitted when the outstanding change is acknowledged.
                debug!(
                    group_id,
                    command_id = display(&command_id),
                    "holding conf change until outstanding change is acked"
                );
                return;
            }
        }

        self.invoke_propose(group_id, &command_id, content);
    }

    fn invoke_propose(
        &mut self,
        group_id: GroupId,
        command_id: &CommandId,
        content: ProposalContent,
    ) {
        let Some(group) = self.groups.get_mut(&group_id) else {
            return;
        };

        let res = match content {
            ProposalContent::Normal { command } => group
                .raw_node
                .propose(vec![], encode_command(command_id, &command)),
            ProposalContent::ConfChange {
                change,
                node_id,
                payload,
            } => {
                let mut cc = ConfChange::default();
                cc.set_change_type(change.conf_change_type());
                cc.set_node_id(node_id);
                cc.set_context(encode_conf_context(
                    command_id, change, &payload,
                ).into());
                group.raw_node.propose_conf_change(vec![], cc)
            }
        };

        if let Err(err) = res {
            // The proposal stays pending; a leader change or membership ack
            // re-submits it.
            error!(
                id = self.id,
                group_id,
                command_id = display(command_id),
                error = display(&err),
                "error proposing to group"
            );
        }

        self.dirty.insert(group_id);
    }

    /// Re-submits every pending proposal of a group through the proposal
    /// channel.
    pub(crate) fn requeue_pending(&mut self, group_id: GroupId) {
        let Some(group) = self.groups.get(&group_id) else {
            return;
        };

        let requeued: Vec<Proposal> =
            group.pending.values().map(|p| p.requeued()).collect();

        for proposal in requeued {
            if self.tx_proposal.try_send(proposal).is_err() {
                self.strict_error(format!(
                    "group {}: proposal queue full while re-submitting",
                    group_id
                ));
                break;
            }
        }
    }

    fn handle_tick(&mut self) {
        for (group_id, group) in self.groups.iter_mut() {
            group.raw_node.tick();
            self.dirty.insert(*group_id);
        }

        self.ticks += 1;
        if self.ticks >= self.config.heartbeat_interval_ticks {
            self.ticks = 0;
            self.coalesced_heartbeat();
        }
    }

    fn handle_callback(&mut self, callback: Callback) {
        match callback {
            Callback::ConfChangeApplied {
                group_id,
                change,
                kind,
                accepted,
            } => self.apply_conf_change(group_id, change, kind, accepted),
        }
    }

    /// Runs after the application acknowledged a committed membership change:
    /// applies it to the embedded Raft, adjusts the peer registry, releases
    /// the conf-change gate and retries the group's pending proposals.
    fn apply_conf_change(
        &mut self,
        group_id: GroupId,
        change: ConfChange,
        kind: MembershipChange,
        accepted: bool,
    ) {
        if !self.groups.contains_key(&group_id) {
            debug!(group_id, "conf change ack for removed group");
            return;
        }

        let node_id = change.get_node_id();

        if accepted {
            debug!(
                id = self.id,
                group_id, node_id, "applying configuration change"
            );

            match kind {
                MembershipChange::AddNode => {
                    if let Err(err) = self.add_peer(node_id, group_id) {
                        error!(
                            node_id,
                            group_id,
                            error = display(&err),
                            "error registering added node"
                        );
                    }
                }
                MembershipChange::RemoveNode => {
                    self.remove_peer_from_group(node_id, group_id);
                }
                MembershipChange::UpdateNode => {
                    // Updates replace member metadata only; the peer set is
                    // untouched and nothing is applied to the embedded Raft.
                }
            }

            if kind != MembershipChange::UpdateNode {
                let apply_res = {
                    let Some(group) = self.groups.get_mut(&group_id) else {
                        return;
                    };
                    group
                        .raw_node
                        .apply_conf_change(&change)
                        .map(|conf_state| {
                            (conf_state, group.storage.clone())
                        })
                };

                match apply_res {
                    Ok((conf_state, storage)) => {
                        // Later snapshots must carry the new member set.
                        if let Err(err) = storage.set_conf_state(&conf_state)
                        {
                            error!(
                                group_id,
                                error = display(&err),
                                "error persisting conf state"
                            );
                        }
                        self.metrics_changed = true;
                    }
                    Err(err) => {
                        self.strict_error(format!(
                            "group {}: error applying conf change: {}",
                            group_id, err
                        ));
                    }
                }
            }
        } else {
            warn!(group_id, node_id, "aborting configuration change");
        }

        if let Some(group) = self.groups.get_mut(&group_id) {
            group.waiting_conf_ack = false;
        }

        // Re-submit all pending proposals, in case any were membership
        // changes held back by the one-at-a-time rule.
        self.requeue_pending(group_id);
        self.dirty.insert(group_id);
    }

    /// Sends a group's outbound messages, dropping per-group heartbeats and
    /// deduplicating heartbeat responses to one per peer per cycle.
    fn send_group_messages(
        &mut self,
        group_id: GroupId,
        messages: Vec<Message>,
        responded: &mut HashSet<NodeId>,
    ) {
        for message in messages {
            match message.get_msg_type() {
                MessageType::MsgHeartbeat => {
                    // Replaced by the coalesced per-peer heartbeat.
                    continue;
                }
                MessageType::MsgHeartbeatResponse => {
                    if !responded.insert(message.get_to()) {
                        debug!(
                            id = self.id,
                            to = message.get_to(),
                            "dropped redundant heartbeat response"
                        );
                        continue;
                    }
                }
                _ => {}
            }

            self.send_message(group_id, message);
        }
    }

    fn send_message(&mut self, group_id: GroupId, message: Message) {
        debug!(
            id = self.id,
            group_id,
            message = display(describe_message(
                &message,
                self.entry_formatter.as_ref()
            )),
            "sending message"
        );

        let to = message.get_to();

        if !self.peers.contains_key(&to) {
            debug!(id = self.id, to, "connecting to new node");
            if let Err(err) = self.add_peer(to, group_id) {
                error!(to, error = display(&err), "error adding node");
            }
        }

        let is_snapshot = message.get_msg_type() == MessageType::MsgSnapshot;

        let res = self
            .transport
            .send(to, RaftMessageRequest::new(group_id, message));

        let mut snapshot_status = SnapshotStatus::Finish;
        if let Err(err) = res {
            warn!(
                id = self.id,
                to,
                error = display(&err),
                "failed to send message"
            );
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.raw_node.report_unreachable(to);
                self.dirty.insert(group_id);
            }
            snapshot_status = SnapshotStatus::Failure;
        }

        if is_snapshot {
            // No acknowledgment scheme; status is reported optimistically on
            // send.
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.raw_node.report_snapshot(to, snapshot_status);
                self.dirty.insert(group_id);
            }
        }
    }

    fn log_raft_ready(&self, batch: &HashMap<GroupId, Ready>) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }

        for (group_id, ready) in batch {
            debug!(id = self.id, group_id, "group raft ready");
            if let Some(ss) = ready.ss() {
                debug!("  SoftState updated: leader={}", ss.leader_id);
            }
            if let Some(hs) = ready.hs() {
                debug!(
                    "  HardState updated: term={} vote={} commit={}",
                    hs.get_term(),
                    hs.get_vote(),
                    hs.get_commit()
                );
            }
            for entry in ready.entries() {
                debug!(
                    "  New entry: {}",
                    describe_entry(entry, self.entry_formatter.as_ref())
                );
            }
            for entry in ready.committed_entries() {
                debug!(
                    "  Committed entry: {}",
                    describe_entry(entry, self.entry_formatter.as_ref())
                );
            }
            for message in ready.messages() {
                debug!(
                    "  Outgoing: {}",
                    describe_message(message, self.entry_formatter.as_ref())
                );
            }
        }
    }

    pub(crate) fn send_event(&self, event: Event) {
        match self.tx_event.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                // The owner must consume events in a timely manner; a stalled
                // consumer is a liveness bug, not a steady-state condition.
                panic!("multiraft event queue overflow: {}", event);
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    id = self.id,
                    event = display(&event),
                    "event receiver dropped; discarding event"
                );
            }
        }
    }

    /// Panics in strict mode and logs an error otherwise.
    pub(crate) fn strict_error(&self, message: String) {
        if self.config.strict {
            panic!("{}", message);
        }
        error!(id = self.id, "{}", message);
    }

    fn report_metrics(&mut self) {
        if !self.metrics_changed {
            return;
        }
        self.metrics_changed = false;

        let leaders = self
            .groups
            .iter()
            .filter(|(_, g)| g.leader != raft::INVALID_ID)
            .map(|(group_id, g)| (*group_id, g.leader))
            .collect();

        self.tx_metrics.send_modify(|m| {
            m.groups = self.groups.len() as u64;
            m.leaders = leaders;
        });
    }

    /// Fails everything still queued so no caller wedges across shutdown.
    fn drain_on_stop(&mut self) {
        debug!(id = self.id, "draining control channels on stop");

        self.transport.stop(self.id);

        while let Ok(op) = self.rx_create.try_recv() {
            let _ = op.tx.send(Err(Error::ShuttingDown));
        }
        while let Ok(op) = self.rx_remove.try_recv() {
            let _ = op.tx.send(Err(Error::ShuttingDown));
        }
        while let Ok(mut proposal) = self.rx_proposal.try_recv() {
            if let Some(tx) = proposal.tx.take() {
                let _ = tx.send(Err(Error::ShuttingDown));
            }
        }

        for group in self.groups.values_mut() {
            for (_, mut proposal) in group.pending.drain() {
                if let Some(tx) = proposal.tx.take() {
                    let _ = tx.send(Err(Error::ShuttingDown));
                }
            }
        }
    }
}
