//! The heuristic score seam.
//!
//! Scoring itself is an external subsystem; the daemon only reads a
//! `(score, max_score)` snapshot once per tick. [`FixedScore`] pegs the
//! score when no heuristics are configured; [`SharedScore`] is the handle
//! an external provider updates from its own thread.

use qdisk_core::ScoreReading;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// A source of the node's current heuristic score.
pub trait ScoreSource {
    /// Snapshot the current score.
    fn current(&self) -> ScoreReading;
}

/// A constant score, used when no heuristics are configured.
#[derive(Debug, Clone, Copy)]
pub struct FixedScore(ScoreReading);

impl FixedScore {
    pub fn new(score: i32, max_score: i32) -> Self {
        FixedScore(ScoreReading { score, max_score })
    }

    /// Permanently 1 out of 1: every node always qualifies.
    pub fn full() -> Self {
        FixedScore::new(1, 1)
    }
}

impl ScoreSource for FixedScore {
    fn current(&self) -> ScoreReading {
        self.0
    }
}

/// A score slot shared with an external provider.
///
/// The provider runs under its own synchronization and stores snapshots;
/// the pace loop only ever loads. Cloning shares the slot.
#[derive(Debug, Clone)]
pub struct SharedScore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    score: AtomicI32,
    max_score: AtomicI32,
}

impl SharedScore {
    pub fn new(score: i32, max_score: i32) -> Self {
        SharedScore {
            inner: Arc::new(Inner {
                score: AtomicI32::new(score),
                max_score: AtomicI32::new(max_score),
            }),
        }
    }

    /// Store a fresh score snapshot.
    pub fn set(&self, score: i32) {
        self.inner.score.store(score, Ordering::Relaxed);
    }

    /// Store a fresh maximum.
    pub fn set_max(&self, max_score: i32) {
        self.inner.max_score.store(max_score, Ordering::Relaxed);
    }
}

impl ScoreSource for SharedScore {
    fn current(&self) -> ScoreReading {
        ScoreReading {
            score: self.inner.score.load(Ordering::Relaxed),
            max_score: self.inner.max_score.load(Ordering::Relaxed),
        }
    }
}
