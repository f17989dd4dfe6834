//! qdisk quorum daemon.
//!
//! Runs the disk-based quorum arbitration protocol on one cluster node.
//!
//! # Usage
//!
//! ```bash
//! # Start with a configuration file
//! qdiskd --config /etc/qdisk.toml
//!
//! # Foreground with debug logging
//! qdiskd --config /etc/qdisk.toml -f -d
//! ```
//!
//! # Configuration
//!
//! See `DaemonConfig` for all options. Example TOML:
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
//! label = "rack-a quorum"
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

use anyhow::{Context, Result};
use clap::Parser;
use qdisk_disk::{find_device_by_label, FileDisk};
use qdisk_production::runner::spawn_signal_handler;
use qdisk_production::{
    rt, DaemonConfig, FixedScore, Membership, PaceRunner, StaticMembership,
};
use qdisk_quorum::{QuorumConfig, QuorumNode};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// qdisk quorum daemon.
///
/// Arbitrates cluster quorum over a shared block device.
#[derive(Parser, Debug)]
#[command(name = "qdiskd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, default_value = "/etc/qdisk.toml")]
    config: PathBuf,

    /// Enable debug logging and suppress fatal actions
    #[arg(short, long)]
    debug: bool,

    /// Run in the foreground (the default; kept for init-script
    /// compatibility)
    #[arg(short, long)]
    foreground: bool,

    /// Detach standard streams to /dev/null
    #[arg(short = 'Q', long)]
    quiet: bool,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.quiet {
        rt::detach_stdio();
    }

    let debug = cli.debug || std::env::var("QDISK_DEBUGLOG").is_ok_and(|v| v == "1");
    let default_filter = if debug { "debug" } else { &cli.log_level };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("qdisk quorum daemon starting");
    if !cli.foreground {
        debug!("running attached; daemonization is the service manager's job");
    }

    let config = DaemonConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let quorum_config = config.quorum_config(debug);
    let my_id = config.node_id();

    info!(
        node = %my_id,
        interval = quorum_config.interval,
        tko = quorum_config.tko,
        votes = quorum_config.votes,
        "node configuration loaded"
    );

    let mut membership = StaticMembership::new(my_id, config.member_ids());

    // Resolve the quorum device: a label wins over an explicit path.
    let device = match (&config.disk.label, &config.disk.device) {
        (Some(label), _) => match find_device_by_label(label) {
            Ok(path) => {
                info!(device = %path.display(), label, "quorum partition resolved");
                path
            }
            Err(err) => {
                error!(label, %err, "unable to match label to any device");
                check_stop_cman(&mut membership, &quorum_config);
                return Err(err).context("label resolution failed");
            }
        },
        (None, Some(device)) => device.clone(),
        (None, None) => unreachable!("config validation requires a device or label"),
    };

    let disk = match FileDisk::open(&device) {
        Ok(disk) => disk,
        Err(err) => {
            error!(device = %device.display(), %err, "cannot open quorum disk");
            check_stop_cman(&mut membership, &quorum_config);
            return Err(err).context("quorum disk validation failed");
        }
    };
    debug!(
        block_size = disk.header().block_size,
        label = %disk.header().label,
        "quorum disk open"
    );

    rt::lock_memory();
    rt::set_priority(config.scheduler()?, config.daemon.priority);

    // No heuristics subsystem attached: peg the score.
    debug!("permanently setting score to 1/1");
    let score = FixedScore::full();

    // One incarnation per boot of the daemon.
    let incarnation = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(1);

    let node = QuorumNode::new(my_id, incarnation, quorum_config.clone());

    let register_name = config
        .cluster
        .cman_label
        .clone()
        .unwrap_or_else(|| device.display().to_string());

    let (runner, shutdown) = PaceRunner::new(
        node,
        disk,
        membership,
        score,
        register_name,
        config.daemon.status_file.clone(),
    );

    spawn_signal_handler(shutdown);

    info!("quorum daemon started");
    if let Err(err) = runner.run().await {
        error!(%err, "quorum loop failed");
        return Err(err).context("quorum loop failed");
    }

    info!("qdisk shutdown complete");
    Ok(())
}

/// If the daemon cannot start and `stop_cman` is set, take the whole
/// cluster down rather than let it run unprotected; reboot if even that
/// fails.
fn check_stop_cman<M: Membership>(membership: &mut M, config: &QuorumConfig) {
    if !config.stop_cman {
        return;
    }

    warn!("telling membership service to leave the cluster; qdisk is not available");
    if membership.shutdown_cluster().is_err() {
        error!("could not leave the cluster - rebooting");
        std::thread::sleep(Duration::from_secs(5));
        if config.debug {
            error!("debug mode: suppressing reboot");
            return;
        }
        rt::reboot_now();
    }
}
