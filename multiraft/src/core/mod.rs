//! The coordinator: one task that owns every group's embedded Raft instance
//! and advances them in lock-step with durable storage.
//!
//! Input arrives over bounded channels (transport inbox, control ops,
//! proposals, ticks, callbacks) and from the write task's ready/done
//! signals. A three-state pipeline serializes read-from-Raft against
//! write-to-storage so that nothing is applied or sent before it is
//! persisted.

#[allow(clippy::module_inception)]
pub(crate) mod core;
pub(crate) mod group;
mod heartbeat;
pub(crate) mod io;
pub(crate) mod tick;
pub(crate) mod write_task;
