//! Deterministic simulation of a qdisk cluster.
//!
//! Runs any number of [`qdisk_quorum::QuorumNode`] state machines against
//! a shared in-memory disk, entirely synchronously: no tokio, no real
//! time, no real device. Given the same fault schedule, a simulation
//! produces identical results every run.
//!
//! Fidelity choices:
//!
//! - Every block still round-trips through the real on-disk codec
//!   (`qdisk-disk`), so the little-endian layout is exercised end to end.
//! - Within one round, every node reads the *same* disk snapshot (all
//!   reads happen before any node's writes), modeling peers whose ticks
//!   overlap in real time. Writes land in node-id order and become
//!   visible the following round.
//! - Faults are injected per (reader, slot) read path, per node (crash,
//!   resume), and per node score, which is enough to reproduce master
//!   failover, split-brain healing, score collapse, and undead fencing.

mod disk;
mod runner;

pub use disk::{SimDisk, WriteRecord};
pub use runner::{NodeFate, SimulationRunner};
