//! The write task: serializes batched per-group durability work.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use anyerror::AnyError;
use raft::eraftpb::Entry;
use raft::eraftpb::HardState;
use raft::eraftpb::Snapshot;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;

use crate::errors::to_any_error;
use crate::message::GroupId;
use crate::storage::GroupStorage;
use crate::storage::Storage;

/// One batched durability unit: everything a ready batch needs persisted,
/// keyed by group. At most one request is in flight at a time.
#[derive(Default)]
pub(crate) struct WriteRequest {
    pub groups: HashMap<GroupId, GroupWriteRequest>,
}

#[derive(Default)]
pub(crate) struct GroupWriteRequest {
    pub hard_state: Option<HardState>,
    pub snapshot: Option<Snapshot>,
    pub entries: Vec<Entry>,
}

/// Acknowledges that every write in the batch is stable.
pub(crate) struct WriteDone {
    pub groups: Vec<GroupId>,
}

/// Runs on its own worker. The coordinator learns the task is idle by
/// receiving from the ready channel, then hands over the next request; the
/// acknowledgment arrives on the done channel once everything is stable.
///
/// Persistence failure is fatal: callers rely on durability and retrying is
/// out of scope, so the error is forwarded and the coordinator shuts down.
pub(crate) struct WriteTask<S: Storage> {
    pub(crate) storage: Arc<S>,
    pub(crate) rx_request: mpsc::Receiver<WriteRequest>,
    pub(crate) tx_ready: mpsc::Sender<()>,
    pub(crate) tx_done: mpsc::Sender<Result<WriteDone, AnyError>>,
}

impl<S: Storage> WriteTask<S> {
    pub(crate) async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        if *stop_rx.borrow() {
            return;
        }

        loop {
            if self.tx_ready.send(()).await.is_err() {
                return;
            }

            tokio::select! {
                _ = stop_rx.changed() => {
                    debug!("write task stopping");
                    return;
                }
                request = self.rx_request.recv() => {
                    let Some(request) = request else { return };
                    let result = self.execute(&request).map_err(to_any_error);
                    if self.tx_done.send(result).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn execute(&self, request: &WriteRequest) -> io::Result<WriteDone> {
        let mut done = WriteDone {
            groups: Vec::with_capacity(request.groups.len()),
        };

        for (group_id, w) in &request.groups {
            let storage = self.storage.group_storage(*group_id)?;

            // Hard state first: a vote or term bump must never trail the
            // entries that depend on it.
            if let Some(hard_state) = &w.hard_state {
                storage.set_hard_state(hard_state)?;
            }
            if let Some(snapshot) = &w.snapshot {
                storage.apply_snapshot(snapshot)?;
            }
            if !w.entries.is_empty() {
                storage.append(&w.entries)?;
            }

            done.groups.push(*group_id);
        }

        Ok(done)
    }
}
