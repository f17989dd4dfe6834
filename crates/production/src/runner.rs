//! The paced production runner.

use crate::membership::{Membership, MembershipError};
use crate::score::ScoreSource;
use crate::{rt, status_file};
use qdisk_core::{Action, Event, RebootReason, SlotRead, StateMachine};
use qdisk_disk::QuorumDisk;
use qdisk_quorum::{CycleVerdict, QuorumConfig, QuorumNode};
use qdisk_types::{NodeId, MAX_NODES};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Errors that halt quorum-disk operations.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("membership service failed: {0}")]
    Membership(#[from] MembershipError),
}

/// Handle for shutting down a running [`PaceRunner`].
///
/// The runner finishes the current tick, writes its logout block, and
/// unregisters before exiting.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Request a clean shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Drives the [`QuorumNode`] state machine at the configured interval
/// against a real disk, membership service, and score provider.
pub struct PaceRunner<D, M, S> {
    node: QuorumNode,
    disk: D,
    membership: M,
    score: S,
    config: QuorumConfig,
    /// Name the quorum device is registered under (device path or the
    /// configured label).
    register_name: String,
    status_file: Option<String>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<D, M, S> PaceRunner<D, M, S>
where
    D: QuorumDisk,
    M: Membership,
    S: ScoreSource,
{
    pub fn new(
        node: QuorumNode,
        disk: D,
        membership: M,
        score: S,
        register_name: String,
        status_file: Option<String>,
    ) -> (Self, ShutdownHandle) {
        let config = node.config().clone();
        let (tx, rx) = watch::channel(false);
        (
            PaceRunner {
                node,
                disk,
                membership,
                score,
                config,
                register_name,
                status_file,
                shutdown_rx: rx,
            },
            ShutdownHandle { tx },
        )
    }

    /// Run until shutdown is requested or the membership service fails.
    ///
    /// Per tick: read every node's status block, snapshot score and
    /// membership, hand the state machine one `Tick`, execute its
    /// actions, then judge the cycle time and sleep out the remainder of
    /// the interval. The logout block is written even when the loop ends
    /// in error; only the unregistration is skipped then.
    pub async fn run(mut self) -> Result<(), RunnerError> {
        let result = self.pace_loop().await;

        let actions = self.node.handle(Event::Shutdown {
            now: self.now_secs(),
        });
        match result {
            Ok(()) => self.execute(actions)?,
            Err(err) => {
                for action in actions {
                    if let Action::WriteOwnStatus { block } = action {
                        if let Err(write_err) = self.disk.write_block(block.node_id, &block) {
                            warn!(%write_err, "error writing to quorum disk during logout");
                        }
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    async fn pace_loop(&mut self) -> Result<(), RunnerError> {
        let start_actions = self.node.handle(Event::Start {
            now: self.now_secs(),
        });
        self.execute(start_actions)?;

        while !*self.shutdown_rx.borrow() {
            let cycle_start = Instant::now();

            self.membership.dispatch()?;

            let now = self.now_secs();
            let slots = self.read_slots();
            let score = self.score.current();
            let members = self.membership.nodes()?;

            let actions = self.node.handle(Event::Tick {
                now,
                slots,
                score,
                members,
            });
            self.execute(actions)?;

            match self.config.cycle_verdict(cycle_start.elapsed()) {
                CycleVerdict::OnSchedule { sleep } => {
                    let mut shutdown_rx = self.shutdown_rx.clone();
                    tokio::select! {
                        _ = tokio::time::sleep(sleep) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
                CycleVerdict::Overrun => {
                    warn!(
                        interval = self.config.interval,
                        elapsed = ?cycle_start.elapsed(),
                        "cycle took more than the configured interval"
                    );
                }
                CycleVerdict::Deadline => {
                    error!(
                        budget = ?self.config.max_cycle(),
                        elapsed = ?cycle_start.elapsed(),
                        "failed to complete a cycle within the eviction window - REBOOTING"
                    );
                    self.fence(Action::Reboot {
                        reason: RebootReason::DeadlineMiss,
                    });
                }
            }
        }

        Ok(())
    }

    fn read_slots(&mut self) -> Vec<SlotRead> {
        (0..MAX_NODES)
            .map(|slot| {
                let node = NodeId::from_slot(slot);
                let block = match self.disk.read_block(node) {
                    Ok(block) => Some(block),
                    Err(err) => {
                        debug!(%node, %err, "status block read failed");
                        None
                    }
                };
                SlotRead { slot, block }
            })
            .collect()
    }

    fn execute(&mut self, actions: Vec<Action>) -> Result<(), RunnerError> {
        for action in actions {
            match action {
                Action::WriteOwnStatus { block } => {
                    if let Err(err) = self.disk.write_block(block.node_id, &block) {
                        error!(%err, "error writing to quorum disk");
                    }
                }
                Action::WriteEviction { node, block } => {
                    if let Err(err) = self.disk.write_block(node, &block) {
                        error!(%node, %err, "error writing eviction notice");
                    }
                }
                Action::PollQuorumDevice { available } => {
                    if let Err(err) = self.membership.poll_quorum_device(available) {
                        error!(%err, "halting qdisk operations");
                        return Err(err.into());
                    }
                }
                Action::KillNode { node } => {
                    if let Err(err) = self.membership.kill_node(node) {
                        warn!(%node, %err, "kill request failed");
                    }
                }
                Action::RegisterQuorumDevice { votes } => {
                    let name = self.register_name.clone();
                    if let Err(err) = self.membership.register_quorum_device(&name, votes) {
                        // The original tolerates a failing registration
                        // call and keeps running.
                        warn!(%err, "quorum device registration failed");
                    }
                }
                Action::UnregisterQuorumDevice => {
                    if let Err(err) = self.membership.unregister_quorum_device() {
                        warn!(%err, "quorum device unregistration failed");
                    }
                }
                Action::EmitStatus { snapshot } => {
                    if let Some(path) = &self.status_file {
                        if let Err(err) = status_file::write_status(path, &snapshot) {
                            warn!(path, %err, "status file write failed");
                        }
                    }
                }
                fatal @ (Action::Reboot { .. } | Action::Halt { .. }) => {
                    self.fence(fatal);
                }
            }
        }
        Ok(())
    }

    /// Execute a fatal action, honoring debug-mode suppression.
    fn fence(&self, action: Action) {
        match action {
            Action::Reboot { reason } => {
                if self.config.debug {
                    error!(?reason, "debug mode: suppressing reboot");
                } else {
                    error!(?reason, "rebooting");
                    rt::reboot_now();
                }
            }
            Action::Halt { reason } => {
                if self.config.debug {
                    error!(reason, "debug mode: suppressing halt");
                } else {
                    error!(reason, "stopping process");
                    rt::halt_self();
                }
            }
            other => {
                debug!(action = other.type_name(), "not a fatal action");
            }
        }
    }

    fn now_secs(&self) -> u64 {
        if self.config.use_uptime {
            if let Some(uptime) = read_uptime_secs() {
                return uptime;
            }
            warn!("cannot read uptime; falling back to wall clock");
        }
        wall_secs()
    }
}

/// Seconds since boot, from `/proc/uptime`. Immune to wall-clock jumps,
/// which matters because peers compare our successive timestamps.
fn read_uptime_secs() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/uptime").ok()?;
    let first = contents.split_whitespace().next()?;
    let seconds: f64 = first.parse().ok()?;
    Some(seconds as u64)
}

fn wall_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Spawn the SIGINT/SIGTERM listener that triggers a clean shutdown.
pub fn spawn_signal_handler(shutdown: ShutdownHandle) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(%err, "cannot install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => {
                    warn!(%err, "cannot install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C"),
            _ = terminate => info!("received SIGTERM"),
        }

        shutdown.shutdown();
    });
}
