//! Daemon configuration.
//!
//! Loaded from a TOML file; each section has per-field defaults so a
//! minimal config only names the node id and the device (or label).
//!
//! ```toml
//! [node]
//! id = 1
//!
//! [cluster]
//! nodes = [1, 2, 3]
//! votes = 1
//!
//! [disk]
//! device = "/dev/sdb1"
//! # label = "rack-a quorum"     # overrides device when set
//!
//! [quorum]
//! interval = 1
//! tko = 10
//!
//! [daemon]
//! status_file = "/var/run/qdisk_status"
//! scheduler = "rr"
//! priority = 1
//! ```

use crate::rt::Scheduler;
use qdisk_quorum::QuorumConfig;
use qdisk_types::{NodeId, MAX_NODES};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Node identity.
    pub node: NodeSection,

    /// Cluster membership settings.
    #[serde(default)]
    pub cluster: ClusterSection,

    /// Quorum disk location.
    #[serde(default)]
    pub disk: DiskSection,

    /// Protocol timing and thresholds.
    #[serde(default)]
    pub quorum: QuorumSection,

    /// Daemon behavior flags and host integration.
    #[serde(default)]
    pub daemon: DaemonSection,
}

/// Node identity.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    /// This node's 1-based cluster id.
    pub id: u32,
}

/// Cluster membership settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterSection {
    /// All node ids in the cluster (self is implied).
    #[serde(default)]
    pub nodes: Vec<u32>,

    /// Name to register the quorum device under instead of the device
    /// path.
    #[serde(default)]
    pub cman_label: Option<String>,

    /// Votes the quorum device contributes.
    #[serde(default = "default_votes")]
    pub votes: u32,
}

/// Quorum disk location. `label` overrides `device` when both are set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskSection {
    /// Device path.
    #[serde(default)]
    pub device: Option<PathBuf>,

    /// Label to resolve to a device by scanning the partition table.
    #[serde(default)]
    pub label: Option<String>,
}

/// Protocol timing and thresholds; 0 keeps a derived default.
#[derive(Debug, Clone, Deserialize)]
pub struct QuorumSection {
    /// Seconds between ticks.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Misses before a peer is declared offline.
    #[serde(default = "default_tko")]
    pub tko: u32,

    /// Fresh heartbeats before a peer is declared online (0 = tko / 3).
    #[serde(default)]
    pub tko_up: u32,

    /// Ticks after coming online before we may bid.
    #[serde(default = "default_upgrade_wait")]
    pub upgrade_wait: u32,

    /// Ticks a bid must age before winning (0 = tko / 2).
    #[serde(default)]
    pub master_wait: u32,

    /// Minimum score to participate (0 = majority of maximum).
    #[serde(default)]
    pub min_score: i32,
}

impl Default for QuorumSection {
    fn default() -> Self {
        QuorumSection {
            interval: default_interval(),
            tko: default_tko(),
            tko_up: 0,
            upgrade_wait: default_upgrade_wait(),
            master_wait: 0,
            min_score: 0,
        }
    }
}

/// Daemon behavior flags and host integration.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSection {
    /// Status file path; `-` writes to stdout, unset disables the dump.
    #[serde(default)]
    pub status_file: Option<String>,

    /// Scheduling queue: `rr`, `fifo`, or `other`.
    #[serde(default = "default_scheduler")]
    pub scheduler: String,

    /// Scheduling priority (or nice value for `other`).
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Reboot when our score collapses while participating.
    #[serde(default = "default_true")]
    pub reboot: bool,

    /// Ask the membership service to kill evicted nodes.
    #[serde(default = "default_true")]
    pub allow_kill: bool,

    /// Stamp blocks with uptime instead of wall-clock time.
    #[serde(default = "default_true")]
    pub use_uptime: bool,

    /// Reboot when a cycle overruns `interval * tko`.
    #[serde(default)]
    pub paranoid: bool,

    /// Shut the cluster down if the daemon cannot start.
    #[serde(default)]
    pub stop_cman: bool,
}

impl Default for DaemonSection {
    fn default() -> Self {
        DaemonSection {
            status_file: None,
            scheduler: default_scheduler(),
            priority: default_priority(),
            reboot: true,
            allow_kill: true,
            use_uptime: true,
            paranoid: false,
            stop_cman: false,
        }
    }
}

fn default_votes() -> u32 {
    1
}

fn default_interval() -> u64 {
    1
}

fn default_tko() -> u32 {
    10
}

fn default_upgrade_wait() -> u32 {
    2
}

fn default_scheduler() -> String {
    "rr".to_string()
}

fn default_priority() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

impl DaemonConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !NodeId(self.node.id).is_valid() {
            return Err(ConfigError::Invalid(format!(
                "node id {} is out of range 1..={MAX_NODES}",
                self.node.id
            )));
        }
        for id in &self.cluster.nodes {
            if !NodeId(*id).is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "cluster node id {id} is out of range 1..={MAX_NODES}"
                )));
            }
        }
        if self.disk.device.is_none() && self.disk.label.is_none() {
            return Err(ConfigError::Invalid(
                "either disk.device or disk.label must be set".to_string(),
            ));
        }
        self.scheduler()?;
        Ok(())
    }

    /// The parsed scheduling queue.
    pub fn scheduler(&self) -> Result<Scheduler, ConfigError> {
        self.daemon.scheduler.parse().map_err(ConfigError::Invalid)
    }

    /// This node's id.
    pub fn node_id(&self) -> NodeId {
        NodeId(self.node.id)
    }

    /// The configured cluster node ids.
    pub fn member_ids(&self) -> Vec<NodeId> {
        self.cluster.nodes.iter().map(|id| NodeId(*id)).collect()
    }

    /// Build the normalized protocol configuration. `debug` suppresses
    /// fatal actions for diagnosis.
    pub fn quorum_config(&self, debug: bool) -> QuorumConfig {
        let mut config = QuorumConfig::new()
            .with_interval(self.quorum.interval)
            .with_tko(self.quorum.tko)
            .with_tko_up(self.quorum.tko_up)
            .with_upgrade_wait(self.quorum.upgrade_wait)
            .with_master_wait(self.quorum.master_wait)
            .with_min_score(self.quorum.min_score);
        config.votes = self.cluster.votes;
        config.reboot = self.daemon.reboot;
        config.allow_kill = self.daemon.allow_kill;
        config.use_uptime = self.daemon.use_uptime;
        config.paranoid = self.daemon.paranoid;
        config.stop_cman = self.daemon.stop_cman;
        config.debug = debug;
        config.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> Result<DaemonConfig, ConfigError> {
        let config: DaemonConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [node]
            id = 1

            [disk]
            device = "/dev/sdb1"
            "#,
        )
        .unwrap();

        assert_eq!(config.node_id(), NodeId(1));
        assert_eq!(config.cluster.votes, 1);
        assert_eq!(config.quorum.interval, 1);
        assert_eq!(config.quorum.tko, 10);
        assert!(config.daemon.reboot);
        assert!(config.daemon.allow_kill);
        assert!(config.daemon.use_uptime);
        assert!(!config.daemon.paranoid);

        let quorum = config.quorum_config(false);
        assert_eq!(quorum.tko_up, 3);
        assert_eq!(quorum.master_wait, 5);
    }

    #[test]
    fn device_or_label_is_required() {
        let err = parse(
            r#"
            [node]
            id = 1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn out_of_range_node_id_is_rejected() {
        let err = parse(
            r#"
            [node]
            id = 17

            [disk]
            device = "/dev/sdb1"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_scheduler_is_rejected() {
        let err = parse(
            r#"
            [node]
            id = 1

            [disk]
            device = "/dev/sdb1"

            [daemon]
            scheduler = "batch"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn full_config_round_trips_into_quorum_config() {
        let config = parse(
            r#"
            [node]
            id = 2

            [cluster]
            nodes = [1, 2]
            votes = 3
            cman_label = "qd"

            [disk]
            label = "rack-a quorum"

            [quorum]
            interval = 2
            tko = 7
            tko_up = 3
            upgrade_wait = 4
            master_wait = 5
            min_score = 1

            [daemon]
            status_file = "-"
            scheduler = "fifo"
            priority = 10
            reboot = false
            allow_kill = false
            use_uptime = false
            paranoid = true
            stop_cman = true
            "#,
        )
        .unwrap();

        let quorum = config.quorum_config(true);
        assert_eq!(quorum.interval, 2);
        assert_eq!(quorum.tko, 7);
        assert_eq!(quorum.tko_up, 3);
        assert_eq!(quorum.upgrade_wait, 4);
        assert_eq!(quorum.master_wait, 5);
        assert_eq!(quorum.min_score, 1);
        assert_eq!(quorum.votes, 3);
        assert!(!quorum.reboot);
        assert!(!quorum.allow_kill);
        assert!(!quorum.use_uptime);
        assert!(quorum.paranoid);
        assert!(quorum.stop_cman);
        assert!(quorum.debug);
        assert_eq!(config.scheduler().unwrap(), Scheduler::Fifo);
        assert_eq!(config.member_ids(), vec![NodeId(1), NodeId(2)]);
    }
}
