//! Protocol configuration.

use std::time::Duration;

/// Tunables and flags for the quorum protocol.
///
/// Out-of-range values are clamped by [`QuorumConfig::normalized`] the same
/// way the daemon's configuration loader clamps them, so a config can be
/// built field-by-field and normalized once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumConfig {
    /// Seconds between ticks.
    pub interval: u64,
    /// Consecutive unchanged timestamps after which a peer is declared
    /// offline ("technical knockout").
    pub tko: u32,
    /// Consecutive fresh timestamps required to declare a peer online.
    /// 0 means "derive from tko" (tko / 3, minimum 2).
    pub tko_up: u32,
    /// Ticks after coming online during which we may not bid for master.
    pub upgrade_wait: u32,
    /// Ticks a bid must age, with unanimous acks, before we assume the
    /// master role. 0 means "derive from tko" (tko / 2); always clamped
    /// above `tko_up`.
    pub master_wait: u32,
    /// Minimum heuristic score required to participate. 0 means "majority
    /// of the maximum score" (max / 2 + 1).
    pub min_score: i32,
    /// Votes the quorum device contributes to cluster quorum.
    pub votes: u32,
    /// Reboot when our score collapses while we were participating.
    pub reboot: bool,
    /// Ask the membership service to kill nodes we evict.
    pub allow_kill: bool,
    /// Stamp blocks with uptime rather than wall-clock seconds.
    pub use_uptime: bool,
    /// Reboot if a cycle overruns `interval * tko`.
    pub paranoid: bool,
    /// Ask the membership service to shut the cluster down if we cannot
    /// start.
    pub stop_cman: bool,
    /// Diagnostic mode: fatal actions are logged instead of executed.
    pub debug: bool,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        QuorumConfig {
            interval: 1,
            tko: 10,
            tko_up: 0,
            upgrade_wait: 2,
            master_wait: 0,
            min_score: 0,
            votes: 1,
            reboot: true,
            allow_kill: true,
            use_uptime: true,
            paranoid: false,
            stop_cman: false,
            debug: false,
        }
    }
}

/// What the pace loop should do after measuring one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleVerdict {
    /// The cycle fit in the interval; sleep out the remainder.
    OnSchedule { sleep: Duration },
    /// The cycle overran the interval; warn and start the next tick
    /// immediately.
    Overrun,
    /// The cycle overran `interval * tko` under the paranoid flag: we can
    /// no longer guarantee a heartbeat landed within the eviction window,
    /// so the machine must reboot.
    Deadline,
}

impl QuorumConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_tko(mut self, tko: u32) -> Self {
        self.tko = tko;
        self
    }

    pub fn with_tko_up(mut self, tko_up: u32) -> Self {
        self.tko_up = tko_up;
        self
    }

    pub fn with_upgrade_wait(mut self, upgrade_wait: u32) -> Self {
        self.upgrade_wait = upgrade_wait;
        self
    }

    pub fn with_master_wait(mut self, master_wait: u32) -> Self {
        self.master_wait = master_wait;
        self
    }

    pub fn with_min_score(mut self, min_score: i32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Clamp every field into its legal range, deriving the dependent
    /// defaults (`tko_up`, `master_wait`) where they were left at 0.
    pub fn normalized(mut self) -> Self {
        self.interval = self.interval.max(1);
        self.tko = self.tko.max(3);

        if self.tko_up == 0 {
            self.tko_up = self.tko / 3;
        }
        self.tko_up = self.tko_up.max(2);

        self.upgrade_wait = self.upgrade_wait.max(1);

        if self.master_wait == 0 {
            self.master_wait = self.tko / 2;
        }
        // A bid must outlive the online-detection window, or a node could
        // crown itself before late starters become visible.
        if self.master_wait <= self.tko_up {
            self.master_wait = self.tko_up + 1;
        }

        self.min_score = self.min_score.max(0);
        self
    }

    /// The pacing interval as a [`Duration`].
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// The cycle-time budget: a tick that takes longer than this can no
    /// longer promise a heartbeat within the eviction window.
    pub fn max_cycle(&self) -> Duration {
        Duration::from_secs(self.interval * self.tko as u64)
    }

    /// The score a node must reach to participate, given the provider's
    /// maximum.
    pub fn required_score(&self, max_score: i32) -> i32 {
        if self.min_score > 0 {
            self.min_score
        } else {
            max_score / 2 + 1
        }
    }

    /// Judge one measured cycle. Debug-mode suppression of the deadline
    /// reboot is the runner's decision; the verdict only reports the
    /// overrun class.
    pub fn cycle_verdict(&self, elapsed: Duration) -> CycleVerdict {
        if self.paranoid && elapsed > self.max_cycle() {
            return CycleVerdict::Deadline;
        }
        let interval = self.interval_duration();
        if elapsed > interval {
            CycleVerdict::Overrun
        } else {
            CycleVerdict::OnSchedule {
                sleep: interval - elapsed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_normalize_to_original_values() {
        let config = QuorumConfig::default().normalized();
        assert_eq!(config.interval, 1);
        assert_eq!(config.tko, 10);
        assert_eq!(config.tko_up, 3);
        assert_eq!(config.upgrade_wait, 2);
        assert_eq!(config.master_wait, 5);
        assert_eq!(config.min_score, 0);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = QuorumConfig::new()
            .with_interval(0)
            .with_tko(1)
            .with_tko_up(1)
            .with_upgrade_wait(0)
            .with_min_score(-5)
            .normalized();
        assert_eq!(config.interval, 1);
        assert_eq!(config.tko, 3);
        assert_eq!(config.tko_up, 2);
        assert_eq!(config.upgrade_wait, 1);
        assert_eq!(config.min_score, 0);
    }

    #[test]
    fn master_wait_is_forced_above_tko_up() {
        let config = QuorumConfig::new()
            .with_tko(3)
            .with_tko_up(2)
            .with_master_wait(2)
            .normalized();
        assert_eq!(config.master_wait, 3);

        let config = QuorumConfig::new().with_tko(10).normalized();
        assert_eq!(config.master_wait, 5);
    }

    #[test]
    fn required_score_defaults_to_majority() {
        let config = QuorumConfig::default().normalized();
        assert_eq!(config.required_score(1), 1);
        assert_eq!(config.required_score(10), 6);

        let config = QuorumConfig::new().with_min_score(4).normalized();
        assert_eq!(config.required_score(10), 4);
    }

    #[test]
    fn cycle_verdict_classes() {
        let mut config = QuorumConfig::new().with_interval(1).with_tko(3).normalized();

        match config.cycle_verdict(Duration::from_millis(200)) {
            CycleVerdict::OnSchedule { sleep } => {
                assert_eq!(sleep, Duration::from_millis(800));
            }
            other => panic!("expected OnSchedule, got {other:?}"),
        }

        assert_eq!(
            config.cycle_verdict(Duration::from_millis(1500)),
            CycleVerdict::Overrun
        );

        // Past the budget without paranoid: still only an overrun.
        assert_eq!(
            config.cycle_verdict(Duration::from_secs(4)),
            CycleVerdict::Overrun
        );

        config.paranoid = true;
        assert_eq!(
            config.cycle_verdict(Duration::from_secs(4)),
            CycleVerdict::Deadline
        );
        // Exactly at the budget is still within it.
        assert_eq!(
            config.cycle_verdict(Duration::from_secs(3)),
            CycleVerdict::Overrun
        );
    }
}
