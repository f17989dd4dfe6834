//! On-disk layout and block I/O for the quorum disk.
//!
//! The quorum disk is a shared block device carrying one header block plus
//! one status block per possible node:
//!
//! ```text
//! block 0: header  (magic, version, block size, label)
//! block 1: node 1's status block
//! block 2: node 2's status block
//! ...
//! block N: node N's status block     (N = MAX_NODES)
//! ```
//!
//! Every on-disk integer is canonical little-endian regardless of host;
//! the codecs in [`block`] and [`header`] swap on both read and write.
//! Block size equals the device's reported sector size, so every status
//! block write is a single-sector, atomically observable write.

pub mod block;
pub mod device;
pub mod error;
pub mod header;

pub use block::{decode_status_block, encode_status_block, STATUS_BLOCK_MAGIC};
pub use device::{find_device_by_label, FileDisk, QuorumDisk};
pub use error::DiskError;
pub use header::{QuorumHeader, HEADER_MAGIC, VERSION_MAGIC_V2};

use qdisk_types::NodeId;

/// Byte offset of a node's status block for a given block size.
pub fn nodeid_offset(node: NodeId, block_size: u32) -> u64 {
    node.0 as u64 * block_size as u64
}

/// Smallest supported sector size; also the fallback for regular files.
pub const MIN_BLOCK_SIZE: u32 = 512;

/// Total device size needed for a given block size: the header plus one
/// slot per possible node.
pub fn required_size(block_size: u32) -> u64 {
    (qdisk_types::MAX_NODES as u64 + 1) * block_size as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_block_aligned() {
        assert_eq!(nodeid_offset(NodeId(1), 512), 512);
        assert_eq!(nodeid_offset(NodeId(16), 512), 8192);
        assert_eq!(nodeid_offset(NodeId(3), 4096), 12288);
    }

    #[test]
    fn required_size_covers_all_slots() {
        assert_eq!(required_size(512), 17 * 512);
    }
}
