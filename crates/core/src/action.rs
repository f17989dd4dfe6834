//! Action types for the deterministic state machine.

use crate::StatusSnapshot;
use qdisk_types::{NodeId, StatusBlock};

/// Why the state machine is asking for a reboot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootReason {
    /// Another node wrote an eviction notice into our slot.
    Fenced,
    /// Our score collapsed below the participation threshold and the
    /// reboot flag is set.
    ScoreLost,
    /// A pacing cycle overran `interval * tko`; issued by the runner, not
    /// the state machine, but funneled through the same execution path.
    DeadlineMiss,
}

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do. The runner
/// executes them in order; all observable side effects of a tick happen
/// before the next tick starts.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════
    // Disk
    // ═══════════════════════════════════════════════════════════════════
    /// Write our own status block. Emitted every tick; a failed write is
    /// logged and skipped (the next tick writes again).
    WriteOwnStatus {
        /// The fully populated block, `updatenode` set to our id.
        block: StatusBlock,
    },

    /// Write an eviction notice into another node's slot. Only the master
    /// evicts on heartbeat timeout; every observer re-evicts an undead
    /// node.
    WriteEviction {
        /// The node being evicted.
        node: NodeId,
        /// The notice: state `Evict`, `updatenode` set to our id.
        block: StatusBlock,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Membership service
    // ═══════════════════════════════════════════════════════════════════
    /// Cast or withdraw our quorum-device vote.
    PollQuorumDevice {
        /// `true`: the disk heartbeat path considers us alive.
        available: bool,
    },

    /// Ask the membership service to kill an evicted node.
    KillNode { node: NodeId },

    /// Register the quorum device after initialization completes.
    RegisterQuorumDevice { votes: u32 },

    /// Unregister the quorum device on clean shutdown.
    UnregisterQuorumDevice,

    // ═══════════════════════════════════════════════════════════════════
    // Observability
    // ═══════════════════════════════════════════════════════════════════
    /// Emit the per-tick human-readable status snapshot. The runner
    /// renders it to the configured status file.
    EmitStatus { snapshot: Box<StatusSnapshot> },

    // ═══════════════════════════════════════════════════════════════════
    // Fencing
    // ═══════════════════════════════════════════════════════════════════
    /// Reboot the machine. Suppressed (logged only) in debug mode.
    Reboot { reason: RebootReason },

    /// Stop the process (SIGSTOP): something wrote an unexpected state
    /// into our slot. Suppressed (logged only) in debug mode.
    Halt { reason: String },
}

impl Action {
    /// Whether this action fences the local node.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Action::Reboot { .. } | Action::Halt { .. })
    }

    /// Get the action type name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::WriteOwnStatus { .. } => "WriteOwnStatus",
            Action::WriteEviction { .. } => "WriteEviction",
            Action::PollQuorumDevice { .. } => "PollQuorumDevice",
            Action::KillNode { .. } => "KillNode",
            Action::RegisterQuorumDevice { .. } => "RegisterQuorumDevice",
            Action::UnregisterQuorumDevice => "UnregisterQuorumDevice",
            Action::EmitStatus { .. } => "EmitStatus",
            Action::Reboot { .. } => "Reboot",
            Action::Halt { .. } => "Halt",
        }
    }
}
