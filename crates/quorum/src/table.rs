//! The in-memory per-peer node table.

use qdisk_types::{DiskMessage, NodeId, NodeState, StatusBlock, MAX_NODES};

/// What we know about one peer: its latest status block plus our own
/// liveness bookkeeping and belief about its state.
///
/// `state` is our *belief* and may lag the peer's self-reported
/// `status.state`; the transition rules reconcile the two.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// The latest status block read from the peer's slot.
    pub status: StatusBlock,
    /// The message in the latest block.
    pub msg: DiskMessage,
    /// The message from the previous tick, kept for edge detection.
    pub last_msg: DiskMessage,
    /// The incarnation we observed when the peer came online; 0 when the
    /// peer is offline.
    pub incarnation: u64,
    /// The incarnation at which the peer was evicted. Further writes at
    /// this value mean the peer failed to die.
    pub evil_incarnation: u64,
    /// The block timestamp we last saw change.
    pub last_seen: u64,
    /// Consecutive ticks the timestamp did not change.
    pub misses: u32,
    /// Consecutive ticks the timestamp did change.
    pub seen: u32,
    /// Our belief about the peer's state.
    pub state: NodeState,
}

impl NodeRecord {
    fn new(node_id: NodeId, now: u64) -> Self {
        NodeRecord {
            status: StatusBlock::empty(node_id),
            msg: DiskMessage::default(),
            last_msg: DiskMessage::default(),
            incarnation: 0,
            evil_incarnation: 0,
            last_seen: now,
            misses: 0,
            seen: 0,
            state: NodeState::None,
        }
    }

    /// The id owning this record's slot.
    pub fn node_id(&self) -> NodeId {
        self.status.node_id
    }

    /// Reset liveness bookkeeping after an eviction or shutdown.
    pub fn reset(&mut self) {
        self.incarnation = 0;
        self.seen = 0;
        self.misses = 0;
        self.state = NodeState::None;
    }
}

/// Flat array of per-peer records, indexed by `node_id - 1`.
///
/// Allocated once at startup; records are reset, never destroyed.
#[derive(Debug, Clone)]
pub struct NodeTable {
    records: Vec<NodeRecord>,
}

impl NodeTable {
    /// A fresh table. `now` seeds every record's `last_seen`, so a peer's
    /// first fresh timestamp is only counted once it actually differs.
    pub fn new(now: u64) -> Self {
        let records = (0..MAX_NODES)
            .map(|slot| NodeRecord::new(NodeId::from_slot(slot), now))
            .collect();
        NodeTable { records }
    }

    /// The record for a 0-based slot.
    pub fn slot(&self, slot: usize) -> &NodeRecord {
        &self.records[slot]
    }

    /// Mutable record for a 0-based slot.
    pub fn slot_mut(&mut self, slot: usize) -> &mut NodeRecord {
        &mut self.records[slot]
    }

    /// The record for a node id, if the id is in range.
    pub fn get(&self, node: NodeId) -> Option<&NodeRecord> {
        if node.is_valid() {
            Some(&self.records[node.slot()])
        } else {
            None
        }
    }

    /// Iterate records in slot (= node id) order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.iter()
    }

    /// Iterate records mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NodeRecord> {
        self.records.iter_mut()
    }

    /// Number of slots (always [`MAX_NODES`]).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Never true; present for clippy's sake alongside `len`.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
