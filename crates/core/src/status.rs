//! Per-tick status snapshot payloads.

use qdisk_types::{DiskMessage, NodeId, NodeState};

/// One node-table record, included in the snapshot in debug mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSnapshot {
    pub node_id: NodeId,
    pub incarnation: u64,
    pub evil_incarnation: u64,
    pub last_seen: u64,
    pub misses: u32,
    pub seen: u32,
    pub msg: DiskMessage,
    pub last_msg: DiskMessage,
    pub state: NodeState,
}

/// Everything the human-readable status file shows for one tick.
///
/// Built by the state machine, rendered by the runner. The master line is
/// omitted while the local node is still initializing, and the quorate set
/// is present only once a master is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Wall-clock or uptime seconds at snapshot time.
    pub now: u64,
    /// The local node id.
    pub node_id: NodeId,
    /// Current heuristic score.
    pub score: i32,
    /// Score required to participate.
    pub score_req: i32,
    /// Maximum achievable score.
    pub score_max: i32,
    /// The local node's own state.
    pub state: NodeState,
    /// Nodes currently writing `Init` blocks that we have seen heartbeat.
    pub initializing: Vec<NodeId>,
    /// Nodes we believe are online, plus ourselves.
    pub visible: Vec<NodeId>,
    /// The elected master, if any.
    pub master: Option<NodeId>,
    /// Nodes granted quorum by the master's mask; empty without a master.
    pub quorate: Vec<NodeId>,
    /// Full node-table dump, present in debug mode only.
    pub records: Option<Vec<RecordSnapshot>>,
}
