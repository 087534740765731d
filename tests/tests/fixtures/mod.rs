//! A router harness assembling multi-node clusters over the in-memory
//! transport and storage.

// Each test binary uses its own subset of the harness.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::Result;
use loopnet::LoopNetwork;
use memstore::MemRaftStorage;
use multiraft::Config;
use multiraft::Event;
use multiraft::GroupId;
use multiraft::MultiRaft;
use multiraft::NodeId;
use multiraft::Stopper;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio::time::Instant;

pub type Node = MultiRaft<MemRaftStorage, LoopNetwork>;

/// One in-process cluster: nodes, their storages and their event streams.
pub struct LoopRouter {
    pub config: Arc<Config>,
    pub net: LoopNetwork,
    pub stopper: Stopper,
    nodes: BTreeMap<NodeId, Node>,
    storages: BTreeMap<NodeId, MemRaftStorage>,
    events: BTreeMap<NodeId, mpsc::Receiver<Event>>,
}

impl LoopRouter {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            net: LoopNetwork::new(),
            stopper: Stopper::new(),
            nodes: BTreeMap::new(),
            storages: BTreeMap::new(),
            events: BTreeMap::new(),
        }
    }

    /// Create and start a node.
    pub fn add_node(&mut self, id: NodeId) -> Result<()> {
        let storage = MemRaftStorage::new();
        let node = MultiRaft::new(
            id,
            self.config.clone(),
            self.net.clone(),
            storage.clone(),
        )?;
        let events = node
            .take_events()
            .ok_or_else(|| anyhow!("events already taken"))?;

        node.start(&self.stopper);

        self.nodes.insert(id, node);
        self.storages.insert(id, storage);
        self.events.insert(id, events);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(&id).expect("unknown node")
    }

    /// Seed a group's initial voter set into the storages of the given
    /// members.
    pub fn seed_group(&self, group_id: GroupId, voters: &[NodeId]) {
        for id in voters {
            self.seed_group_on(*id, group_id, voters);
        }
    }

    /// Seed a group's initial voter set into one node's storage only.
    pub fn seed_group_on(
        &self,
        node_id: NodeId,
        group_id: GroupId,
        voters: &[NodeId],
    ) {
        self.storages
            .get(&node_id)
            .expect("unknown node")
            .register_group(group_id, voters);
    }

    /// Seed and create a group on every member.
    pub async fn new_group(
        &self,
        group_id: GroupId,
        voters: &[NodeId],
    ) -> Result<()> {
        self.seed_group(group_id, voters);
        for id in voters {
            self.node(*id).create_group(group_id).await?;
        }
        Ok(())
    }

    /// Receive events from `node_id` until one matches `pred`, discarding
    /// the rest. Returns the matching event.
    pub async fn wait_event<F>(
        &mut self,
        node_id: NodeId,
        ttl: Duration,
        what: &str,
        pred: F,
    ) -> Result<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let rx = self
            .events
            .get_mut(&node_id)
            .ok_or_else(|| anyhow!("unknown node {}", node_id))?;

        let deadline = Instant::now() + ttl;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(anyhow!(
                    "node {}: timeout waiting for {}",
                    node_id,
                    what
                ));
            }

            match timeout(remaining, rx.recv()).await {
                Ok(Some(event)) => {
                    tracing::debug!("node {} event: {}", node_id, event);
                    if pred(&event) {
                        return Ok(event);
                    }
                }
                Ok(None) => {
                    return Err(anyhow!(
                        "node {}: event stream closed while waiting for {}",
                        node_id,
                        what
                    ))
                }
                Err(_) => {
                    return Err(anyhow!(
                        "node {}: timeout waiting for {}",
                        node_id,
                        what
                    ))
                }
            }
        }
    }

    /// Assert that no event matching `pred` arrives within `ttl`.
    pub async fn expect_no_event<F>(
        &mut self,
        node_id: NodeId,
        ttl: Duration,
        what: &str,
        pred: F,
    ) -> Result<()>
    where
        F: Fn(&Event) -> bool,
    {
        match self.wait_event(node_id, ttl, what, pred).await {
            Ok(event) => Err(anyhow!(
                "node {}: unexpected {}: {}",
                node_id,
                what,
                event
            )),
            Err(_) => Ok(()),
        }
    }

    /// Wait for a `LeaderElection` for `group_id` and return the leader id.
    pub async fn wait_leader(
        &mut self,
        node_id: NodeId,
        group_id: GroupId,
        ttl: Duration,
    ) -> Result<NodeId> {
        let event = self
            .wait_event(node_id, ttl, "leader election", |event| {
                matches!(
                    event,
                    Event::LeaderElection { group_id: g, .. } if *g == group_id
                )
            })
            .await?;

        match event {
            Event::LeaderElection { node_id, .. } => Ok(node_id),
            _ => unreachable!(),
        }
    }

    /// Wait for a membership-change event with the given command id and
    /// acknowledge it, returning `(kind, node_id, payload)`.
    pub async fn ack_membership(
        &mut self,
        node_id: NodeId,
        command_id: &str,
        ttl: Duration,
    ) -> Result<(multiraft::MembershipChange, NodeId, Vec<u8>)> {
        let wanted = command_id.to_string();
        let event = self
            .wait_event(node_id, ttl, "membership change", |event| {
                matches!(
                    event,
                    Event::MembershipChangeCommitted { command_id, .. }
                        if command_id == &wanted
                )
            })
            .await?;

        match event {
            Event::MembershipChangeCommitted {
                node_id: changed,
                kind,
                payload,
                ack,
                ..
            } => {
                ack.ack(Ok(())).await;
                Ok((kind, changed, payload))
            }
            _ => unreachable!(),
        }
    }

    /// Inject `count` logical ticks into every node, one round at a time.
    pub async fn tick_all(&self, count: usize) -> Result<()> {
        for _ in 0..count {
            for node in self.nodes.values() {
                node.tick().await?;
            }
            // Let each node drain the tick before the next round.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        Ok(())
    }

    /// Inject `count` logical ticks into one node.
    pub async fn tick_node(&self, node_id: NodeId, count: usize) -> Result<()> {
        for _ in 0..count {
            self.node(node_id).tick().await?;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        Ok(())
    }

    pub async fn shutdown(self) {
        self.stopper.stop().await;
    }
}

/// Pads a label to a full 16-byte command id.
pub fn cid(label: &str) -> String {
    let mut id = label.to_string();
    id.truncate(multiraft::COMMAND_ID_LEN);
    while id.len() < multiraft::COMMAND_ID_LEN {
        id.push('_');
    }
    id
}

/// A config driven by real time with short intervals.
pub fn ut_config() -> Arc<Config> {
    Arc::new(
        Config {
            tick_interval_ms: 10,
            election_timeout_ticks: 10,
            heartbeat_interval_ticks: 3,
            ..Config::default()
        }
        .validate()
        .unwrap(),
    )
}

/// A config with ticking disabled; tests drive logical time by hand.
pub fn manual_tick_config() -> Arc<Config> {
    Arc::new(
        Config {
            enable_tick: false,
            election_timeout_ticks: 10,
            heartbeat_interval_ticks: 3,
            ..Config::default()
        }
        .validate()
        .unwrap(),
    )
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
