//! Quorum disk header codec.
//!
//! The header lives in block 0 and identifies the device as a quorum
//! disk: magic, on-disk format version, the block size the disk was
//! created with, and a human-chosen label used for device resolution.
//!
//! ```text
//! offset  size  field
//!      0     4  magic
//!      4     4  version
//!      8     4  block_size
//!     12     4  max_nodes
//!     16     8  created   (seconds since epoch)
//!     24     8  updated   (seconds since epoch)
//!     32    64  label     (NUL-padded UTF-8)
//! ```

use crate::{DiskError, MIN_BLOCK_SIZE};
use bytes::{Buf, BufMut};
use qdisk_types::MAX_NODES;

/// Magic tag of the header block ("QDHD").
pub const HEADER_MAGIC: u32 = 0x4448_4451;

/// Current on-disk format version.
pub const VERSION_MAGIC_V2: u32 = 0x7164_0002;

/// Width of the NUL-padded label field.
pub const LABEL_BYTES: usize = 64;

/// Encoded payload size, before sector padding.
pub const HEADER_BYTES: usize = 32 + LABEL_BYTES;

/// The decoded header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumHeader {
    /// On-disk format version.
    pub version: u32,
    /// Block size the disk was created with; must match the device's
    /// sector size when the disk is opened.
    pub block_size: u32,
    /// Node slots on this disk.
    pub max_nodes: u32,
    /// When the disk was created.
    pub created: u64,
    /// Last time the header was rewritten.
    pub updated: u64,
    /// Human-chosen label.
    pub label: String,
}

impl QuorumHeader {
    /// A fresh header for a newly created disk.
    pub fn new(label: &str, block_size: u32, now: u64) -> Result<Self, DiskError> {
        if label.len() > LABEL_BYTES {
            return Err(DiskError::LabelTooLong(label.len()));
        }
        Ok(QuorumHeader {
            version: VERSION_MAGIC_V2,
            block_size: block_size.max(MIN_BLOCK_SIZE),
            max_nodes: MAX_NODES as u32,
            created: now,
            updated: now,
            label: label.to_string(),
        })
    }

    /// Encode into a sector-sized buffer.
    pub fn encode(&self, block_size: u32) -> Result<Vec<u8>, DiskError> {
        if self.label.len() > LABEL_BYTES {
            return Err(DiskError::LabelTooLong(self.label.len()));
        }
        let mut buf = Vec::with_capacity(block_size as usize);
        buf.put_u32_le(HEADER_MAGIC);
        buf.put_u32_le(self.version);
        buf.put_u32_le(self.block_size);
        buf.put_u32_le(self.max_nodes);
        buf.put_u64_le(self.created);
        buf.put_u64_le(self.updated);
        let mut label = [0u8; LABEL_BYTES];
        label[..self.label.len()].copy_from_slice(self.label.as_bytes());
        buf.put_slice(&label);
        buf.resize(block_size as usize, 0);
        Ok(buf)
    }

    /// Decode from a sector read off the disk.
    pub fn decode(mut buf: &[u8]) -> Result<Self, DiskError> {
        if buf.len() < HEADER_BYTES {
            return Err(DiskError::ShortBlock {
                expected: HEADER_BYTES,
                got: buf.len(),
            });
        }

        let magic = buf.get_u32_le();
        if magic != HEADER_MAGIC {
            return Err(DiskError::BadMagic { found: magic });
        }

        let version = buf.get_u32_le();
        if version != VERSION_MAGIC_V2 {
            return Err(DiskError::BadVersion { found: version });
        }

        let block_size = buf.get_u32_le();
        let max_nodes = buf.get_u32_le();
        let created = buf.get_u64_le();
        let updated = buf.get_u64_le();

        let mut label = [0u8; LABEL_BYTES];
        buf.copy_to_slice(&mut label);
        let end = label.iter().position(|b| *b == 0).unwrap_or(LABEL_BYTES);
        let label = String::from_utf8_lossy(&label[..end]).into_owned();

        Ok(QuorumHeader {
            version,
            block_size,
            max_nodes,
            created,
            updated,
            label,
        })
    }
}
