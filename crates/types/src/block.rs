//! The per-node record persisted on the quorum disk.

use crate::{DiskMessage, MessageKind, NodeId, NodeMask, NodeState};

/// A node's status block: one fixed-size record per node, written only by
/// its owner (except for eviction notices) and read by everyone.
///
/// Invariants:
/// - `node_id` matches the slot the block is stored at;
/// - `timestamp` and `seq` are non-decreasing within one `incarnation`;
/// - `master_mask` is meaningful only when the writer is master;
/// - `updatenode` records who performed the write, which is how a node
///   discovers that someone else (the master, via an eviction notice) has
///   written into its slot.
///
/// The little-endian on-disk encoding lives in `qdisk-disk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBlock {
    /// Owner of this slot (1-based).
    pub node_id: NodeId,
    /// Self-reported state of the writer.
    pub state: NodeState,
    /// Reserved flag bits, currently always zero.
    pub flags: u32,
    /// Identifies one boot of the owning node; changes on clean restart.
    pub incarnation: u64,
    /// Wall-clock or uptime seconds at write time; peers detect liveness
    /// by watching this change.
    pub timestamp: u64,
    /// Node id that performed this write; differs from `node_id` only for
    /// eviction notices.
    pub updatenode: u32,
    /// Current heuristic score of the writer.
    pub score: i32,
    /// Score required for the writer to participate.
    pub score_req: i32,
    /// Maximum achievable score of the writer.
    pub score_max: i32,
    /// Outbound election message.
    pub msg: MessageKind,
    /// Message target node id, 0 when unused.
    pub arg: u32,
    /// Message sequence number.
    pub seq: u32,
    /// Which peers the writer believes are online.
    pub node_mask: NodeMask,
    /// Which nodes the master grants quorum; zero unless the writer is
    /// master.
    pub master_mask: NodeMask,
}

impl StatusBlock {
    /// An empty (never written) block for `node_id`'s slot.
    pub fn empty(node_id: NodeId) -> Self {
        StatusBlock {
            node_id,
            state: NodeState::None,
            flags: 0,
            incarnation: 0,
            timestamp: 0,
            updatenode: 0,
            score: 0,
            score_req: 0,
            score_max: 0,
            msg: MessageKind::None,
            arg: 0,
            seq: 0,
            node_mask: NodeMask::EMPTY,
            master_mask: NodeMask::EMPTY,
        }
    }

    /// The message fields of this block as a [`DiskMessage`].
    pub fn message(&self) -> DiskMessage {
        DiskMessage {
            kind: self.msg,
            arg: self.arg,
            seq: self.seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_block_is_silent() {
        let block = StatusBlock::empty(NodeId(4));
        assert_eq!(block.node_id, NodeId(4));
        assert_eq!(block.state, NodeState::None);
        assert_eq!(block.message(), DiskMessage::default());
        assert!(block.node_mask.is_empty());
    }
}
