//! End-to-end protocol scenarios over the deterministic simulation.
//!
//! Each test drives a small cluster through a fault schedule and checks
//! the externally observable outcome: who is master, what was written to
//! the shared disk, and what the membership service was told. All runs
//! are synchronous and deterministic; there is no real time and no real
//! device, but every block still round-trips the real on-disk codec.

use qdisk_core::RebootReason;
use qdisk_quorum::QuorumConfig;
use qdisk_simulation::{NodeFate, SimulationRunner};
use qdisk_types::{MessageKind, NodeId, NodeState};
use tracing_test::traced_test;

const N1: NodeId = NodeId(1);
const N2: NodeId = NodeId(2);
const N3: NodeId = NodeId(3);

/// The timing used across scenarios: 1s interval, 3 misses to evict,
/// 2 fresh heartbeats to admit, 2 ticks of bid cooldown. master_wait
/// normalizes to tko_up + 1 = 3.
fn config() -> QuorumConfig {
    QuorumConfig::new()
        .with_interval(1)
        .with_tko(3)
        .with_tko_up(2)
        .with_master_wait(2)
        .with_upgrade_wait(2)
        .normalized()
}

fn elect(sim: &mut SimulationRunner, expected_master: NodeId) {
    sim.run_until(40, |s| s.status(expected_master) == NodeState::Master);
}

#[traced_test]
#[test]
fn s1_cold_start_single_node() {
    let mut sim = SimulationRunner::new(1, config());
    sim.start_all();

    // Initialization: tko ticks of watching the disk, no mastership.
    sim.run_ticks(3);
    assert_eq!(sim.status(N1), NodeState::None);
    assert_eq!(sim.registrations(), &[(N1, 1)]);

    // None -> Run -> (cooldown) -> bid -> aged bid -> Master.
    sim.run_until(10, |s| s.status(N1) == NodeState::Master);
    assert_eq!(sim.round(), 8, "lone node should be master ~5 ticks after init");
    assert_eq!(sim.master_of(N1), Some(N1));

    // As master it votes the quorum device in.
    sim.tick();
    assert_eq!(sim.last_poll(N1), Some(true));
}

#[traced_test]
#[test]
fn s2_two_nodes_simultaneous_start() {
    let mut sim = SimulationRunner::new(2, config());
    sim.start_all();

    elect(&mut sim, N1);

    // The lowest id won; the other stayed a voter.
    assert_eq!(sim.status(N2), NodeState::Run);
    assert_eq!(sim.masters(), vec![N1]);

    // Node 2 voted for node 1's bid, echoing the bid's sequence number.
    let bid_seq = sim
        .disk()
        .own_writes(N1)
        .iter()
        .find(|b| b.msg == MessageKind::Bid)
        .expect("node 1 must have bid")
        .seq;
    let ack = sim
        .disk()
        .own_writes(N2)
        .iter()
        .find(|b| b.msg == MessageKind::Ack)
        .copied()
        .expect("node 2 must have acked");
    assert_eq!(ack.arg, N1.0);
    assert_eq!(ack.seq, bid_seq);

    // Once the master's mask includes node 2, both vote the device in.
    sim.run_until(5, |s| s.last_poll(N2) == Some(true));
    assert_eq!(sim.last_poll(N1), Some(true));
    assert_eq!(sim.master_of(N2), Some(N1));
}

#[traced_test]
#[test]
fn s3_master_dies_lowest_survivor_takes_over() {
    let mut sim = SimulationRunner::new(3, config());
    sim.start_all();
    elect(&mut sim, N1);

    sim.crash(N1);

    // Peers miss heartbeats past tko, evict the master locally, and the
    // lowest surviving id bids and wins after master_wait.
    sim.run_until(20, |s| s.status(N2) == NodeState::Master);
    assert_eq!(sim.masters(), vec![N2]);
    assert_eq!(sim.status(N3), NodeState::Run);
    assert_eq!(sim.master_of(N3), Some(N2));

    // Node 3 acked node 2's takeover bid.
    assert!(sim
        .disk()
        .own_writes(N3)
        .iter()
        .any(|b| b.msg == MessageKind::Ack && b.arg == N2.0));
}

#[traced_test]
#[test]
fn s4_split_brain_heals_by_mutual_abdication() {
    let mut sim = SimulationRunner::new(2, config());

    // Neither node can read the other's slot: both see an empty cluster,
    // both bid unopposed, both become master.
    sim.partition(N1, N2);
    sim.start_all();
    sim.run_until(15, |s| s.masters().len() == 2);

    sim.heal(N1, N2);

    // Healed: each discovers the other master and both abdicate in the
    // same round.
    sim.run_until(10, |s| s.masters().is_empty());
    let abdication_round = sim.round();
    assert_eq!(sim.status(N1), NodeState::Run);
    assert_eq!(sim.status(N2), NodeState::Run);

    // The lower id is re-elected once its upgrade cooldown expires.
    sim.run_until(15, |s| s.status(N1) == NodeState::Master);
    assert!(
        sim.round() - abdication_round
            <= (config().upgrade_wait + config().master_wait) as u64,
        "re-election must finish within upgrade_wait + master_wait ticks"
    );
    assert_eq!(sim.status(N2), NodeState::Run);
    assert_eq!(sim.masters(), vec![N1]);
}

#[traced_test]
#[test]
fn s5_score_collapse_on_master() {
    let mut config = config();
    config.reboot = false;
    let mut sim = SimulationRunner::new(3, config);
    sim.start_all();
    elect(&mut sim, N1);
    sim.run_until(5, |s| s.last_poll(N1) == Some(true));

    // The master's heuristics fail: it withdraws, tells the membership
    // service it no longer contributes, and keeps writing None blocks.
    sim.set_score(N1, 0, 1);
    sim.tick();
    assert_eq!(sim.status(N1), NodeState::None);
    assert_eq!(sim.last_poll(N1), Some(false));
    assert!(sim.fate(N1).is_none());

    // Survivors observe the shutdown and elect the next lowest id.
    sim.run_until(20, |s| s.status(N2) == NodeState::Master);
    assert_eq!(sim.masters(), vec![N2]);
    assert_eq!(sim.status(N1), NodeState::None);

    // With its score restored the old master rejoins as a plain voter;
    // a master exists, so it must not bid.
    sim.set_score(N1, 1, 1);
    sim.run_until(20, |s| s.status(N1) == NodeState::Run);
    sim.run_until(10, |s| s.master_of(N1) == Some(N2));
    assert_eq!(sim.masters(), vec![N2]);
}

#[traced_test]
#[test]
fn s5_score_collapse_with_reboot_flag() {
    let mut sim = SimulationRunner::new(2, config());
    sim.start_all();
    elect(&mut sim, N1);

    sim.set_score(N1, 0, 1);
    sim.tick();
    assert_eq!(
        sim.fate(N1),
        Some(&NodeFate::Rebooted(RebootReason::ScoreLost))
    );
}

#[traced_test]
#[test]
fn s6_undead_revenant_is_refenced_until_reboot() {
    let mut sim = SimulationRunner::new(2, config());
    sim.start_all();
    elect(&mut sim, N1);

    // Node 2 wedges; the master times it out, writes the eviction notice
    // and asks the membership service to kill it.
    sim.crash(N2);
    sim.run_until(15, |s| s.kills().iter().any(|(_, by, target)| (*by, *target) == (N1, N2)));
    let evictions_before = eviction_writes(&sim);
    assert!(evictions_before >= 1);

    // The wedged node comes back without rebooting (same incarnation),
    // and cannot read its own slot, so it never sees the notice.
    sim.fail_own_slot_reads(N2);
    sim.resume(N2);
    let kills_before = sim.kills().len();
    sim.run_ticks(5);

    // Every round the master re-writes the eviction and re-kills.
    assert!(eviction_writes(&sim) >= evictions_before + 3);
    assert!(sim.kills().len() >= kills_before + 3);

    // The revenant never rejoins: the master's belief stays dead.
    let belief = sim.node(N1).table().get(N2).unwrap().state;
    assert!(belief != NodeState::Run && belief != NodeState::Master);
    assert_eq!(sim.masters(), vec![N1]);

    // Only a real reboot (fresh incarnation) clears the undead marker
    // and lets the node back in.
    sim.heal_own_slot_reads(N2);
    sim.restart(N2);
    sim.run_until(20, |s| {
        s.node(N1).table().get(N2).unwrap().state == NodeState::Run
    });
    sim.run_until(10, |s| s.master_of(N2) == Some(N1));
    assert_eq!(sim.status(N2), NodeState::Run);
    assert_eq!(sim.masters(), vec![N1]);
}

fn eviction_writes(sim: &SimulationRunner) -> usize {
    sim.disk()
        .writes()
        .iter()
        .filter(|w| w.writer == N1 && w.target == N2 && w.block.state == NodeState::Evict)
        .count()
}
