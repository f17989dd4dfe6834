//! Production runner for the qdisk daemon.
//!
//! This crate wraps the deterministic state machine from `qdisk-quorum`
//! with real I/O:
//!
//! - status-block reads and writes against a real block device
//!   (`qdisk-disk`)
//! - a tokio-paced tick loop with SIGINT/SIGTERM handling
//! - the cluster membership seam ([`Membership`]) and the heuristic score
//!   seam ([`ScoreSource`])
//! - the human-readable status file
//! - realtime discipline: memory locking, scheduler priority, and the
//!   paranoid deadline reboot
//!
//! # Architecture
//!
//! A single task owns the state machine. Each pacing interval it reads
//! every node's status block, snapshots the score and membership view,
//! hands the state machine one `Event::Tick`, and executes the returned
//! actions in order:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ PaceRunner                                               │
//! │   loop {                                                 │
//! │     slots   = disk.read_block(1..=MAX_NODES)             │
//! │     actions = node.handle(Tick { slots, score, members })│
//! │     execute(actions)   // writes, polls, status file     │
//! │     sleep(interval - elapsed)                            │
//! │   }                                                      │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod membership;
pub mod rt;
pub mod runner;
pub mod score;
pub mod status_file;

pub use config::{ConfigError, DaemonConfig};
pub use membership::{Membership, MembershipError, StaticMembership};
pub use runner::{PaceRunner, RunnerError, ShutdownHandle};
pub use rt::Scheduler;
pub use score::{FixedScore, ScoreSource, SharedScore};
