//! The ordered node state enum.

use std::fmt;

/// Per-node protocol state, both self-reported (in a status block) and
/// believed (in the local node table).
///
/// The ordering is load-bearing: `None < Init < Run < Master < Evict`, and
/// the comparison operators are part of the protocol. Because `Evict` sorts
/// above `Master`, raw range comparisons do not express "running"; use the
/// semantic predicates instead:
///
/// - [`NodeState::is_running`]: the node participates in the protocol
///   (`Init`, `Run`, or `Master`)
/// - [`NodeState::is_online`]: the node is past initialization (`Run` or
///   `Master`)
/// - [`NodeState::is_dead`]: the node is absent or fenced (`None` or
///   `Evict`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum NodeState {
    /// Not participating (never started, shut down, or downgraded).
    #[default]
    None = 0,
    /// Started, waiting out the initialization window.
    Init = 1,
    /// Online and heartbeating.
    Run = 2,
    /// Online and elected coordinator.
    Master = 3,
    /// Fenced by the master (or locally declared dead).
    Evict = 4,
}

impl NodeState {
    /// The node participates in the protocol.
    pub fn is_running(self) -> bool {
        matches!(self, NodeState::Init | NodeState::Run | NodeState::Master)
    }

    /// The node is past initialization and counts for elections.
    pub fn is_online(self) -> bool {
        matches!(self, NodeState::Run | NodeState::Master)
    }

    /// The node is absent or fenced.
    pub fn is_dead(self) -> bool {
        matches!(self, NodeState::None | NodeState::Evict)
    }

    /// Decode a raw on-disk value.
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(NodeState::None),
            1 => Some(NodeState::Init),
            2 => Some(NodeState::Run),
            3 => Some(NodeState::Master),
            4 => Some(NodeState::Evict),
            _ => None,
        }
    }

    /// Human-readable name, as shown in the status file.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::None => "None",
            NodeState::Init => "Initializing",
            NodeState::Run => "Running",
            NodeState::Master => "Master",
            NodeState::Evict => "Evicted",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
