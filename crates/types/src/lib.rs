//! Core types for the qdisk quorum arbitration daemon.
//!
//! This crate provides the foundational types used throughout the
//! implementation:
//!
//! - **Identifiers**: [`NodeId`], the 1-based cluster node id
//! - **Protocol state**: [`NodeState`], the ordered node state enum
//! - **Messages**: [`MessageKind`] / [`DiskMessage`], the one-shot election
//!   messages carried inside status blocks
//! - **Bitmaps**: [`NodeMask`], the fixed-width node membership bitmap
//! - **Records**: [`StatusBlock`], the per-node record persisted on the
//!   quorum disk
//!
//! # Design Philosophy
//!
//! This crate is self-contained with no dependencies. It does not depend on
//! any other workspace crates, making it the foundation layer. The on-disk
//! encoding of these types lives in `qdisk-disk`; everything here is plain
//! in-memory data.

mod block;
mod identifiers;
mod mask;
mod message;
mod state;

pub use block::StatusBlock;
pub use identifiers::{NodeId, MAX_NODES};
pub use mask::{NodeMask, MASK_BYTES};
pub use message::{DiskMessage, MessageKind};
pub use state::NodeState;
