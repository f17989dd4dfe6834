//! Status block codec.
//!
//! A status block occupies one device sector. The payload is 72 bytes;
//! the remainder of the sector is zero padding. All integers are
//! little-endian on disk.
//!
//! ```text
//! offset  size  field
//!      0     4  magic
//!      4     4  node_id
//!      8     4  state
//!     12     4  flags
//!     16     4  updatenode
//!     20     4  msg
//!     24     4  arg
//!     28     4  seq
//!     32     8  incarnation
//!     40     8  timestamp
//!     48     4  score
//!     52     4  score_req
//!     56     4  score_max
//!     60     4  reserved
//!     64     2  node_mask
//!     66     2  master_mask
//!     68     4  reserved
//! ```

use crate::DiskError;
use bytes::{Buf, BufMut};
use qdisk_types::{MessageKind, NodeId, NodeMask, NodeState, StatusBlock, MASK_BYTES, MAX_NODES};

/// Magic tag of a status block ("QDSB").
pub const STATUS_BLOCK_MAGIC: u32 = 0x4253_4451;

/// Encoded payload size, before sector padding.
pub const STATUS_BLOCK_BYTES: usize = 72;

/// Encode a status block into a sector-sized buffer.
pub fn encode_status_block(block: &StatusBlock, block_size: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(block_size as usize);
    buf.put_u32_le(STATUS_BLOCK_MAGIC);
    buf.put_u32_le(block.node_id.0);
    buf.put_u32_le(block.state as u32);
    buf.put_u32_le(block.flags);
    buf.put_u32_le(block.updatenode);
    buf.put_u32_le(block.msg as u32);
    buf.put_u32_le(block.arg);
    buf.put_u32_le(block.seq);
    buf.put_u64_le(block.incarnation);
    buf.put_u64_le(block.timestamp);
    buf.put_i32_le(block.score);
    buf.put_i32_le(block.score_req);
    buf.put_i32_le(block.score_max);
    buf.put_u32_le(0);
    buf.put_slice(block.node_mask.as_bytes());
    buf.put_slice(block.master_mask.as_bytes());
    buf.put_u32_le(0);
    buf.resize(block_size as usize, 0);
    buf
}

/// Decode a status block from a sector read off the disk.
pub fn decode_status_block(mut buf: &[u8]) -> Result<StatusBlock, DiskError> {
    if buf.len() < STATUS_BLOCK_BYTES {
        return Err(DiskError::ShortBlock {
            expected: STATUS_BLOCK_BYTES,
            got: buf.len(),
        });
    }

    let magic = buf.get_u32_le();
    if magic != STATUS_BLOCK_MAGIC {
        return Err(DiskError::BadMagic { found: magic });
    }

    let node_id = buf.get_u32_le();
    if node_id == 0 || node_id > MAX_NODES as u32 {
        return Err(DiskError::NodeIdOutOfRange(node_id));
    }

    let state_raw = buf.get_u32_le();
    let state = NodeState::from_raw(state_raw).ok_or(DiskError::InvalidField {
        field: "state",
        value: state_raw,
    })?;

    let flags = buf.get_u32_le();
    let updatenode = buf.get_u32_le();

    let msg_raw = buf.get_u32_le();
    let msg = MessageKind::from_raw(msg_raw).ok_or(DiskError::InvalidField {
        field: "msg",
        value: msg_raw,
    })?;

    let arg = buf.get_u32_le();
    let seq = buf.get_u32_le();
    let incarnation = buf.get_u64_le();
    let timestamp = buf.get_u64_le();
    let score = buf.get_i32_le();
    let score_req = buf.get_i32_le();
    let score_max = buf.get_i32_le();
    let _reserved = buf.get_u32_le();

    let mut node_mask = [0u8; MASK_BYTES];
    buf.copy_to_slice(&mut node_mask);
    let mut master_mask = [0u8; MASK_BYTES];
    buf.copy_to_slice(&mut master_mask);

    Ok(StatusBlock {
        node_id: NodeId(node_id),
        state,
        flags,
        incarnation,
        timestamp,
        updatenode,
        score,
        score_req,
        score_max,
        msg,
        arg,
        seq,
        node_mask: NodeMask::from_bytes(node_mask),
        master_mask: NodeMask::from_bytes(master_mask),
    })
}
