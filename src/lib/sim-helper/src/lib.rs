//! Time and identifier types shared by every part of the simulator.

pub mod emulated_time;
pub mod simulation_time;
pub mod util;

/// Identifies a simulated node. Ids are dense and assigned in creation order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, serde::Serialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl From<u32> for NodeId {
    fn from(i: u32) -> Self {
        NodeId(i)
    }
}

impl From<NodeId> for u32 {
    fn from(i: NodeId) -> Self {
        i.0
    }
}

impl From<NodeId> for usize {
    fn from(i: NodeId) -> Self {
        // u32 always fits on the platforms we build for
        i.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
