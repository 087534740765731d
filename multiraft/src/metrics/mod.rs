//! Observable state of a coordinator, published over a watch channel.

mod wait;

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::Fatal;
use crate::message::GroupId;
use crate::message::NodeId;

pub use wait::Wait;
pub use wait::WaitError;

/// A snapshot of the coordinator's soft state.
///
/// Updated whenever a group is created or removed or a leader changes; read
/// it through [`MultiRaft::metrics`](crate::MultiRaft::metrics) or wait on a
/// condition with [`MultiRaft::wait`](crate::MultiRaft::wait).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metrics {
    pub running_state: Result<(), Fatal>,

    /// The ID of this node.
    pub id: NodeId,

    /// Number of live groups on this node.
    pub groups: u64,

    /// Last-known leader per group; groups with an election in progress are
    /// absent.
    pub leaders: BTreeMap<GroupId, NodeId>,
}

impl Metrics {
    pub(crate) fn new_initial(id: NodeId) -> Self {
        Self {
            running_state: Ok(()),
            id,
            groups: 0,
            leaders: BTreeMap::new(),
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Metrics{{id:{}, groups:{}, leaders:{:?}, running:{}}}",
            self.id,
            self.groups,
            self.leaders,
            self.running_state.is_ok(),
        )
    }
}
