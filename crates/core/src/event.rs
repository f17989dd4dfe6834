//! Event types for the deterministic state machine.

use qdisk_types::{NodeId, StatusBlock};

/// One node slot as read off the quorum disk this tick.
#[derive(Debug, Clone)]
pub struct SlotRead {
    /// 0-based slot index (slot `i` belongs to node `i + 1`).
    pub slot: usize,
    /// The decoded block, or `None` if the read or decode failed. Failed
    /// slots are skipped for this tick; the record keeps its last state.
    pub block: Option<StatusBlock>,
}

/// A node as reported by the cluster membership service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberNode {
    /// The node's cluster id.
    pub id: NodeId,
    /// Whether the membership service currently counts it as a member.
    pub is_member: bool,
}

/// A snapshot of the heuristic score provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreReading {
    /// Current score.
    pub score: i32,
    /// Maximum achievable score.
    pub max_score: i32,
}

/// All possible events the state machine can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    /// Delivered once before the first tick. The state machine resets its
    /// node table, enters the initialization phase and writes its first
    /// status block.
    Start {
        /// Wall-clock or uptime seconds.
        now: u64,
    },

    /// One pacing tick. The runner performed all reads and snapshots
    /// before delivery, so handling is pure.
    Tick {
        /// Wall-clock or uptime seconds.
        now: u64,
        /// Every node slot, in slot order, including our own.
        slots: Vec<SlotRead>,
        /// Current heuristic score.
        score: ScoreReading,
        /// Current membership service view.
        members: Vec<MemberNode>,
    },

    /// Clean shutdown was requested. The state machine logs out by writing
    /// a final `None` status block and unregistering the quorum device.
    Shutdown {
        /// Wall-clock or uptime seconds.
        now: u64,
    },
}

impl Event {
    /// Get the event type name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "Start",
            Event::Tick { .. } => "Tick",
            Event::Shutdown { .. } => "Shutdown",
        }
    }
}
