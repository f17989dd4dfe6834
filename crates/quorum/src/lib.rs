//! The qdisk membership and master-election protocol.
//!
//! This crate is the deterministic core of the daemon: a state machine that
//! consumes one [`qdisk_core::Event::Tick`] per pacing interval and decides
//! what to write to the shared disk, what to tell the cluster membership
//! service, and when to fence itself.
//!
//! # Per-tick pipeline
//!
//! ```text
//! Scanner → Transitioner → Elector → own-block write → membership signal
//! ```
//!
//! - [`scan`]: apply this tick's block reads to the node table, tracking
//!   per-peer liveness (`misses`/`seen`) and detecting writes into our own
//!   slot (self-check)
//! - [`transition`]: apply the five transition rules per peer, maintaining
//!   the local visibility mask and producing eviction/kill requests
//! - [`election`]: locate a master, arbitrate bids, track our own bid,
//!   resolve master conflicts by abdication
//! - [`QuorumNode`]: composes the above into the daemon's state machine,
//!   including the initialization phase, the score gate, and the
//!   human-readable status snapshot
//!
//! All of it is synchronous and I/O-free; runners live in
//! `qdisk-production` (real disk, tokio pacing) and `qdisk-simulation`
//! (deterministic multi-node harness).

mod config;
mod node;
mod table;

pub mod election;
pub mod scan;
pub mod transition;

pub use config::{CycleVerdict, QuorumConfig};
pub use node::QuorumNode;
pub use table::{NodeRecord, NodeTable};
