//! Scanner: apply one tick's block reads to the node table.

use crate::NodeTable;
use qdisk_core::SlotRead;
use qdisk_types::{NodeId, NodeState};
use tracing::{debug, warn};

/// Outcome of checking our own slot during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfCheck {
    /// Nobody else wrote our slot.
    Ok,
    /// Another node wrote an eviction notice into our slot: we were fenced
    /// while out to lunch and must reboot immediately.
    Fenced { by: NodeId },
    /// Another node wrote something other than an eviction into our slot.
    Unexpected { by: NodeId, state: NodeState },
}

/// Read every peer's slot into the table and update liveness bookkeeping.
///
/// Per slot: a failed read is logged and skipped (the record keeps its last
/// state, and `misses` does not advance). A block owned by `my_id` goes
/// through the self-check instead of peer bookkeeping. For peers, the
/// inbound message is rotated (`last_msg ← msg`), and the timestamp drives
/// `misses`/`seen`: any two consecutive identical timestamps count as one
/// miss, any change counts as one successful update.
pub fn scan_blocks(table: &mut NodeTable, my_id: NodeId, tko: u32, slots: &[SlotRead]) -> SelfCheck {
    let mut self_check = SelfCheck::Ok;

    for read in slots {
        if read.slot >= table.len() {
            continue;
        }

        let block = match &read.block {
            Some(block) => *block,
            None => {
                warn!(node = %NodeId::from_slot(read.slot), "error reading node status block");
                continue;
            }
        };

        let record = table.slot_mut(read.slot);
        record.status = block;

        if block.node_id == my_id {
            if let Some(check) = check_self(my_id, &block) {
                self_check = check;
            }
            continue;
        }

        record.last_msg = record.msg;
        record.msg = block.message();

        if !block.state.is_running() {
            continue;
        }

        if block.timestamp == record.last_seen {
            record.misses += 1;
            if record.misses > 1 {
                debug!(
                    node = %block.node_id,
                    misses = record.misses,
                    tko,
                    "node missed an update"
                );
            }
            continue;
        }

        record.misses = 0;
        record.seen += 1;
        record.last_seen = block.timestamp;
    }

    self_check
}

/// Check whether someone else wrote our slot. The `updatenode` field names
/// the writer; sequence numbers are deliberately not consulted.
fn check_self(my_id: NodeId, block: &qdisk_types::StatusBlock) -> Option<SelfCheck> {
    if block.updatenode == 0 || block.updatenode == my_id.0 {
        return None;
    }
    let by = NodeId(block.updatenode);
    match block.state {
        NodeState::Evict => Some(SelfCheck::Fenced { by }),
        state => Some(SelfCheck::Unexpected { by, state }),
    }
}
