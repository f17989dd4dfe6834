//! Node identifiers.

use std::fmt;

/// Maximum number of nodes a quorum disk can arbitrate for.
///
/// Node ids are 1-based, so valid ids are `1..=MAX_NODES`. This bounds the
/// on-disk layout (one status block per node) and the in-memory node table.
pub const MAX_NODES: usize = 16;

/// A 1-based cluster node identifier.
///
/// Node id 0 is never a valid node; on disk it marks an unset field (for
/// example an `updatenode` that nobody has written yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Whether this id addresses a valid status-block slot.
    pub fn is_valid(self) -> bool {
        self.0 >= 1 && self.0 <= MAX_NODES as u32
    }

    /// The 0-based slot index for this node id.
    ///
    /// Callers must check [`NodeId::is_valid`] first; slot 0 belongs to
    /// node 1.
    pub fn slot(self) -> usize {
        debug_assert!(self.is_valid());
        self.0 as usize - 1
    }

    /// The node id owning a 0-based slot index.
    pub fn from_slot(slot: usize) -> Self {
        NodeId(slot as u32 + 1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
