//! In-memory storage implementing the [`Storage`] and [`GroupStorage`]
//! traits, one embedded-Raft `MemStorage` per group.
//!
//! Groups can be seeded with an initial membership through
//! [`MemRaftStorage::register_group`]; a group never registered starts out
//! empty, which is exactly what lazy creation on inbound messages needs.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;

use multiraft::GroupId;
use multiraft::NodeId;
use raft::eraftpb::ConfState;
use raft::eraftpb::Entry;
use raft::eraftpb::HardState;
use raft::eraftpb::Snapshot;
use raft::storage::MemStorage;
use raft::GetEntriesContext;
use tracing::debug;

/// Hands out one [`MemGroupStorage`] per group. Cloning shares the
/// underlying stores.
#[derive(Clone, Default)]
pub struct MemRaftStorage {
    groups: Arc<Mutex<BTreeMap<GroupId, MemGroupStorage>>>,
}

impl MemRaftStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a group with its initial voter set, before the coordinator
    /// opens it. Replaces any prior content of that group.
    pub fn register_group(&self, group_id: GroupId, voters: &[NodeId]) {
        debug!(group_id, ?voters, "memstore: register group");

        let store = MemStorage::new_with_conf_state(ConfState::from((
            voters.to_vec(),
            vec![],
        )));

        let mut groups = self.groups.lock().unwrap();
        groups.insert(group_id, MemGroupStorage { inner: store });
    }
}

impl multiraft::Storage for MemRaftStorage {
    type GroupStorage = MemGroupStorage;

    fn group_storage(
        &self,
        group_id: GroupId,
    ) -> io::Result<MemGroupStorage> {
        let mut groups = self.groups.lock().unwrap();
        Ok(groups
            .entry(group_id)
            .or_insert_with(|| MemGroupStorage {
                inner: MemStorage::new(),
            })
            .clone())
    }
}

/// One group's log and state, backed by the embedded Raft's `MemStorage`.
#[derive(Clone)]
pub struct MemGroupStorage {
    inner: MemStorage,
}

impl raft::Storage for MemGroupStorage {
    fn initial_state(&self) -> raft::Result<raft::RaftState> {
        self.inner.initial_state()
    }

    fn entries(
        &self,
        low: u64,
        high: u64,
        max_size: impl Into<Option<u64>>,
        context: GetEntriesContext,
    ) -> raft::Result<Vec<Entry>> {
        self.inner.entries(low, high, max_size, context)
    }

    fn term(&self, idx: u64) -> raft::Result<u64> {
        self.inner.term(idx)
    }

    fn first_index(&self) -> raft::Result<u64> {
        self.inner.first_index()
    }

    fn last_index(&self) -> raft::Result<u64> {
        self.inner.last_index()
    }

    fn snapshot(&self, request_index: u64, to: u64) -> raft::Result<Snapshot> {
        self.inner.snapshot(request_index, to)
    }
}

fn to_io(e: raft::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

impl multiraft::GroupStorage for MemGroupStorage {
    fn append(&self, entries: &[Entry]) -> io::Result<()> {
        self.inner.wl().append(entries).map_err(to_io)
    }

    fn set_hard_state(&self, hard_state: &HardState) -> io::Result<()> {
        self.inner.wl().set_hardstate(hard_state.clone());
        Ok(())
    }

    fn apply_snapshot(&self, snapshot: &Snapshot) -> io::Result<()> {
        self.inner.wl().apply_snapshot(snapshot.clone()).map_err(to_io)
    }

    fn set_conf_state(&self, conf_state: &ConfState) -> io::Result<()> {
        self.inner.wl().set_conf_state(conf_state.clone());
        Ok(())
    }
}
