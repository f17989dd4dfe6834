//! Transitioner: the per-peer transition rules.

use crate::{NodeTable, QuorumConfig};
use qdisk_types::{NodeId, NodeMask, NodeState};
use tracing::{debug, error, info};

/// Side effects requested by a transition pass: eviction notices to write
/// and nodes the membership service should kill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionEffects {
    /// Nodes to write an eviction notice for.
    pub evictions: Vec<NodeId>,
    /// Nodes to ask the membership service to kill.
    pub kills: Vec<NodeId>,
}

/// Walk the table and apply, per peer, the first matching transition rule.
///
/// `is_master` gates the heartbeat-timeout eviction notice (rule 2): only
/// the master fences on timeout. Undead re-eviction (rule 3) is performed
/// by every observer. `mask` is the local visibility mask; it is absent
/// during initialization, and zeroed then rebuilt on every pass otherwise.
pub fn check_transitions(
    table: &mut NodeTable,
    config: &QuorumConfig,
    is_master: bool,
    mut mask: Option<&mut NodeMask>,
) -> TransitionEffects {
    let mut effects = TransitionEffects::default();

    if let Some(mask) = mask.as_deref_mut() {
        mask.clear_all();
    }

    for record in table.iter_mut() {
        let node = record.node_id();
        let reported = record.status.state;

        // Rule 1: evicted by the master, cleanly shut down, or restarted
        // with a fresh incarnation. Online -> Offline.
        if (record.state != NodeState::None && !reported.is_running())
            || (record.incarnation != 0 && record.incarnation != record.status.incarnation)
        {
            if reported == NodeState::Evict {
                info!(%node, "node evicted");
            } else {
                info!(%node, "node shutdown");
                // A fresh incarnation clears the undead marker; nothing
                // else ever does.
                record.evil_incarnation = 0;
            }
            record.reset();
            if let Some(mask) = mask.as_deref_mut() {
                mask.clear(node);
            }
            continue;
        }

        // Rule 2: heartbeat timeout. Online -> Evicted. The master writes
        // the eviction notice; everyone marks the peer dead locally, which
        // forces a master transition if no live master remains.
        if record.misses > config.tko && reported.is_running() {
            if is_master {
                info!(%node, "writing eviction notice");
                effects.evictions.push(node);
                if config.allow_kill {
                    debug!(%node, "asking membership service to kill node");
                    effects.kills.push(node);
                }
            }

            if reported.is_online() && record.seen != 0 {
                debug!(%node, "node DOWN");
                record.seen = 0;
            }

            record.state = NodeState::Evict;
            record.status.state = NodeState::Evict;
            record.evil_incarnation = record.status.incarnation;
            if let Some(mask) = mask.as_deref_mut() {
                mask.clear(node);
            }
            continue;
        }

        // Rule 3: a node we evicted is writing again under the same
        // incarnation. It failed to die; fence it again.
        if record.evil_incarnation != 0 && record.evil_incarnation == record.status.incarnation {
            error!(%node, "node is undead");
            error!(%node, "writing eviction notice");
            effects.evictions.push(node);
            record.status.state = NodeState::Evict;
            if config.allow_kill {
                debug!(%node, "asking membership service to kill node");
                effects.kills.push(node);
            }
            continue;
        }

        // Rule 4: enough consecutive fresh heartbeats. Offline -> Online.
        // Node-join is unilateral; there is no consensus round for it.
        if record.seen > config.tko_up && !record.state.is_running() {
            record.state = NodeState::Run;
            debug!(%node, "node UP");
            record.incarnation = record.status.incarnation;
            if let Some(mask) = mask.as_deref_mut() {
                mask.set(node);
            }
            continue;
        }

        // Rule 5: a running peer reports itself master.
        if record.state == NodeState::Run && reported == NodeState::Master {
            info!(%node, "node is the master");
            record.state = NodeState::Master;
            if let Some(mask) = mask.as_deref_mut() {
                mask.set(node);
            }
            continue;
        }

        // Fallthrough: believe whatever a running peer reports.
        if record.state.is_running() {
            record.state = reported;
            if let Some(mask) = mask.as_deref_mut() {
                mask.set(node);
            }
        }
    }

    effects
}
