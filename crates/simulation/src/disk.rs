//! The shared in-memory quorum disk.

use qdisk_disk::{decode_status_block, encode_status_block, MIN_BLOCK_SIZE};
use qdisk_types::{NodeId, StatusBlock, MAX_NODES};
use std::collections::HashSet;
use tracing::debug;

/// One write as observed by the simulated disk, kept for invariant
/// checks.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    /// The node that performed the write.
    pub writer: NodeId,
    /// The slot that was written.
    pub target: NodeId,
    /// The block content.
    pub block: StatusBlock,
}

/// An in-memory quorum disk holding one encoded sector per node slot.
///
/// Reads and writes go through the real status-block codec. Read faults
/// are injected per (reader, slot) pair, mirroring a path failure between
/// one host and part of the device.
pub struct SimDisk {
    block_size: u32,
    slots: Vec<Vec<u8>>,
    read_faults: HashSet<(NodeId, NodeId)>,
    writes: Vec<WriteRecord>,
}

impl Default for SimDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDisk {
    /// A freshly initialized disk: every slot holds an empty status
    /// block, as `mkqdisk` leaves it.
    pub fn new() -> Self {
        let slots = (0..MAX_NODES)
            .map(|slot| {
                let empty = StatusBlock::empty(NodeId::from_slot(slot));
                encode_status_block(&empty, MIN_BLOCK_SIZE)
            })
            .collect();
        SimDisk {
            block_size: MIN_BLOCK_SIZE,
            slots,
            read_faults: HashSet::new(),
            writes: Vec::new(),
        }
    }

    /// Read `target`'s slot as seen by `reader`; `None` models an I/O
    /// error (injected fault or undecodable sector).
    pub fn read(&self, reader: NodeId, target: NodeId) -> Option<StatusBlock> {
        if self.read_faults.contains(&(reader, target)) {
            return None;
        }
        match decode_status_block(&self.slots[target.slot()]) {
            Ok(block) => Some(block),
            Err(err) => {
                debug!(%reader, %target, %err, "undecodable sector");
                None
            }
        }
    }

    /// Write a block into `target`'s slot on behalf of `writer`.
    pub fn write(&mut self, writer: NodeId, target: NodeId, block: &StatusBlock) {
        self.slots[target.slot()] = encode_status_block(block, self.block_size);
        self.writes.push(WriteRecord {
            writer,
            target,
            block: *block,
        });
    }

    /// Decode `target`'s slot directly (no fault injection), for
    /// assertions.
    pub fn block(&self, target: NodeId) -> Option<StatusBlock> {
        decode_status_block(&self.slots[target.slot()]).ok()
    }

    /// Make every read of `target`'s slot by `reader` fail.
    pub fn fail_reads(&mut self, reader: NodeId, target: NodeId) {
        self.read_faults.insert((reader, target));
    }

    /// Undo [`SimDisk::fail_reads`].
    pub fn heal_reads(&mut self, reader: NodeId, target: NodeId) {
        self.read_faults.remove(&(reader, target));
    }

    /// Every write in order, for invariant checks.
    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    /// The blocks `writer` wrote into its own slot, in order.
    pub fn own_writes(&self, writer: NodeId) -> Vec<StatusBlock> {
        self.writes
            .iter()
            .filter(|w| w.writer == writer && w.target == writer)
            .map(|w| w.block)
            .collect()
    }
}
