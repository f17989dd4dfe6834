//! The daemon's state machine: one node's view of the quorum protocol.

use crate::election::{self, VoteOutcome};
use crate::scan::{self, SelfCheck};
use crate::transition::{self, TransitionEffects};
use crate::{NodeTable, QuorumConfig};
use qdisk_core::{
    Action, Event, MemberNode, RebootReason, RecordSnapshot, ScoreReading, SlotRead, StateMachine,
    StatusSnapshot,
};
use qdisk_types::{DiskMessage, MessageKind, NodeId, NodeMask, NodeState, StatusBlock};
use tracing::{debug, error, info, warn};

/// Lifecycle phase of the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Constructed, waiting for [`Event::Start`].
    Idle,
    /// Watching the disk for `tko` ticks before joining, so running peers
    /// become visible and a simultaneous-start double bid cannot happen.
    Init { ticks: u32 },
    /// Normal operation.
    Running,
}

/// The per-node quorum state machine.
///
/// Consumes [`Event`]s delivered by a runner and produces [`Action`]s. Per
/// tick the pipeline is: scan the block reads into the node table, apply
/// the transition rules, gate on the heuristic score, run the election,
/// then write our own block and emit the status snapshot.
pub struct QuorumNode {
    my_id: NodeId,
    /// This boot's incarnation; stamped into every block we write.
    incarnation: u64,
    config: QuorumConfig,
    phase: Phase,
    /// Our own state, as we will report it.
    status: NodeState,
    /// The elected master as of the last tick, if any.
    master: Option<NodeId>,
    /// Outbound election message, persisted in our status block.
    msg: DiskMessage,
    /// Age of our pending master bid in ticks; 0 when no bid is in flight.
    bid_age: u32,
    /// Ticks remaining before we may bid after coming online.
    upgrade: u32,
    /// Which peers we believe are online (plus ourselves when scoring).
    mask: NodeMask,
    /// Our grant of quorum as master: visibility mask intersected with the
    /// membership service's live set. Zero while not master.
    master_mask: NodeMask,
    table: NodeTable,
    score: ScoreReading,
    score_req: i32,
}

impl QuorumNode {
    /// Create a node. `incarnation` must change on every boot; the
    /// configuration is normalized here so protocol invariants (for
    /// example `master_wait > tko_up`) always hold.
    pub fn new(my_id: NodeId, incarnation: u64, config: QuorumConfig) -> Self {
        QuorumNode {
            my_id,
            incarnation,
            config: config.normalized(),
            phase: Phase::Idle,
            status: NodeState::None,
            master: None,
            msg: DiskMessage::default(),
            bid_age: 0,
            upgrade: 0,
            mask: NodeMask::EMPTY,
            master_mask: NodeMask::EMPTY,
            table: NodeTable::new(0),
            score: ScoreReading::default(),
            score_req: 0,
        }
    }

    /// The local node id.
    pub fn my_id(&self) -> NodeId {
        self.my_id
    }

    /// This boot's incarnation.
    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    /// Our own current state.
    pub fn status(&self) -> NodeState {
        self.status
    }

    /// The elected master as of the last tick.
    pub fn master(&self) -> Option<NodeId> {
        self.master
    }

    /// Whether we currently hold the master role.
    pub fn is_master(&self) -> bool {
        self.status == NodeState::Master
    }

    /// The normalized configuration this node runs with.
    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    /// The node table, for inspection.
    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    fn start(&mut self, now: u64) -> Vec<Action> {
        if self.phase != Phase::Idle {
            warn!("start event while already started; ignoring");
            return Vec::new();
        }
        info!(node = %self.my_id, "quorum daemon initializing");
        self.table = NodeTable::new(now);
        self.status = NodeState::Init;
        self.phase = Phase::Init { ticks: 0 };
        vec![Action::WriteOwnStatus {
            block: self.own_block(now),
        }]
    }

    fn init_tick(&mut self, now: u64, slots: &[SlotRead], score: ScoreReading) -> Vec<Action> {
        let mut actions = Vec::new();

        match scan::scan_blocks(&mut self.table, self.my_id, self.config.tko, slots) {
            SelfCheck::Ok => {}
            SelfCheck::Fenced { by } => return self.fenced(by),
            SelfCheck::Unexpected { by, state } => self.unexpected_write(&mut actions, by, state),
        }

        // No visibility mask yet: only table state is tracked during
        // initialization.
        let effects = transition::check_transitions(&mut self.table, &self.config, false, None);
        self.push_effects(&mut actions, effects, now);

        actions.push(Action::WriteOwnStatus {
            block: self.own_block(now),
        });

        self.score = score;
        self.score_req = self.config.required_score(score.max_score);
        actions.push(Action::EmitStatus {
            snapshot: Box::new(self.snapshot(now)),
        });

        if let Phase::Init { ticks } = &mut self.phase {
            *ticks += 1;
            if *ticks >= self.config.tko {
                info!(
                    score = score.score,
                    max_score = score.max_score,
                    "initial score"
                );
                info!("initialization complete");
                self.phase = Phase::Running;
                self.status = NodeState::None;
                actions.push(Action::RegisterQuorumDevice {
                    votes: self.config.votes,
                });
            }
        }

        actions
    }

    fn running_tick(
        &mut self,
        now: u64,
        slots: &[SlotRead],
        score: ScoreReading,
        members: &[MemberNode],
    ) -> Vec<Action> {
        let mut actions = Vec::new();

        match scan::scan_blocks(&mut self.table, self.my_id, self.config.tko, slots) {
            SelfCheck::Ok => {}
            SelfCheck::Fenced { by } => return self.fenced(by),
            SelfCheck::Unexpected { by, state } => self.unexpected_write(&mut actions, by, state),
        }

        let is_master = self.status == NodeState::Master;
        let effects = transition::check_transitions(
            &mut self.table,
            &self.config,
            is_master,
            Some(&mut self.mask),
        );
        self.push_effects(&mut actions, effects, now);

        if self.upgrade > 0 {
            self.upgrade -= 1;
        }

        self.score = score;
        self.score_req = self.config.required_score(score.max_score);

        if score.score < self.score_req {
            self.mask.clear(self.my_id);
            if self.status != NodeState::None {
                info!(
                    score = score.score,
                    max_score = score.max_score,
                    required = self.score_req,
                    "score insufficient for master operation; downgrading"
                );
                self.status = NodeState::None;
                self.reset_msg();
                self.bid_age = 0;
                actions.push(Action::PollQuorumDevice { available: false });
                if self.config.reboot {
                    actions.push(Action::Reboot {
                        reason: RebootReason::ScoreLost,
                    });
                }
            }
        } else {
            self.mask.set(self.my_id);
            if self.status == NodeState::None {
                info!(
                    score = score.score,
                    max_score = score.max_score,
                    required = self.score_req,
                    "score sufficient for master operation; upgrading"
                );
                self.status = NodeState::Run;
                self.upgrade = self.config.upgrade_wait;
                self.bid_age = 0;
                self.reset_msg();
            }
        }

        let view = election::find_master(&self.table, self.my_id, self.status);
        self.master = view.master;

        // Another node also claims mastership: abdicate, exactly as after
        // a recent upgrade. The lower id wins the re-election.
        if view.master_count >= 1
            && self.status == NodeState::Master
            && view.master != Some(self.my_id)
        {
            warn!(other = ?view.master, "master conflict: abdicating");
            self.status = NodeState::Run;
            self.upgrade = self.config.upgrade_wait;
            self.bid_age = 0;
            self.reset_msg();
        }

        if self.master.is_none()
            && view.low_id == self.my_id
            && self.status == NodeState::Run
            && self.bid_age == 0
            && self.upgrade == 0
        {
            // No master and we are the lowest online id: make a bid.
            debug!("making bid for master");
            self.msg.kind = MessageKind::Bid;
            self.msg.arg = 0;
            self.msg.seq += 1;
            self.bid_age = 1;
        } else if self.master.is_none() && self.bid_age == 0 {
            election::do_vote(&self.table, self.my_id, &mut self.msg);
        } else if self.master.is_none() && self.bid_age > 0 {
            self.bid_age += 1;
            match election::check_votes(&self.table, self.my_id, &mut self.msg) {
                VoteOutcome::AllAcked => {
                    // Give late starters time to become visible before
                    // assuming the role.
                    if self.bid_age >= self.config.master_wait {
                        info!("assuming master role");
                        self.status = NodeState::Master;
                        self.master = Some(self.my_id);
                        self.reset_msg();
                        self.bid_age = 0;
                    }
                }
                VoteOutcome::Nacked => {
                    self.reset_msg();
                    self.bid_age = 0;
                }
                VoteOutcome::LowerBidder => {
                    // Our vote for the lower bidder is already stashed in
                    // the outbound message.
                    self.bid_age = 0;
                }
                VoteOutcome::Waiting => {}
            }
        } else if self.status == NodeState::Master && self.master == Some(self.my_id) {
            // We are the master: grant quorum to the nodes we can see that
            // the membership service also counts as members.
            self.master_mask = intersect_members(&self.mask, members);
            actions.push(Action::PollQuorumDevice { available: true });
        } else if self.status == NodeState::Run {
            if let Some(master) = self.master.filter(|m| *m != self.my_id) {
                // A master exists; vote our availability only if it counts
                // us among the quorate set.
                let granted = self
                    .table
                    .get(master)
                    .is_some_and(|record| record.status.master_mask.contains(self.my_id));
                if granted {
                    actions.push(Action::PollQuorumDevice { available: true });
                }
            }
        }

        if self.status != NodeState::Master {
            self.master_mask.clear_all();
        }

        actions.push(Action::WriteOwnStatus {
            block: self.own_block(now),
        });
        actions.push(Action::EmitStatus {
            snapshot: Box::new(self.snapshot(now)),
        });

        actions
    }

    fn logout(&mut self, now: u64) -> Vec<Action> {
        if self.phase != Phase::Running {
            info!("shutdown before initialization completed");
            return Vec::new();
        }
        info!("logging out of the quorum disk");
        self.status = NodeState::None;
        self.reset_msg();
        self.mask.clear_all();
        self.master_mask.clear_all();
        vec![
            Action::WriteOwnStatus {
                block: self.own_block(now),
            },
            Action::UnregisterQuorumDevice,
        ]
    }

    fn fenced(&mut self, by: NodeId) -> Vec<Action> {
        error!(%by, "another node evicted us; rebooting");
        vec![Action::Reboot {
            reason: RebootReason::Fenced,
        }]
    }

    fn unexpected_write(&mut self, actions: &mut Vec<Action>, by: NodeId, state: NodeState) {
        error!(%by, %state, "unhandled state written into our status block");
        actions.push(Action::Halt {
            reason: format!("node {by} wrote state {state} into our slot"),
        });
    }

    fn push_effects(&self, actions: &mut Vec<Action>, effects: TransitionEffects, now: u64) {
        for node in effects.evictions {
            actions.push(Action::WriteEviction {
                node,
                block: self.eviction_block(node, now),
            });
        }
        for node in effects.kills {
            actions.push(Action::KillNode { node });
        }
    }

    /// Reset the outbound message. The sequence number always advances so
    /// successive writes with different messages carry different seqs.
    fn reset_msg(&mut self) {
        self.msg.kind = MessageKind::None;
        self.msg.arg = 0;
        self.msg.seq += 1;
    }

    fn own_block(&self, now: u64) -> StatusBlock {
        StatusBlock {
            node_id: self.my_id,
            state: self.status,
            flags: 0,
            incarnation: self.incarnation,
            timestamp: now,
            updatenode: self.my_id.0,
            score: self.score.score,
            score_req: self.score_req,
            score_max: self.score.max_score,
            msg: self.msg.kind,
            arg: self.msg.arg,
            seq: self.msg.seq,
            node_mask: self.mask,
            master_mask: self.master_mask,
        }
    }

    fn eviction_block(&self, node: NodeId, now: u64) -> StatusBlock {
        let mut block = StatusBlock::empty(node);
        block.state = NodeState::Evict;
        block.timestamp = now;
        block.updatenode = self.my_id.0;
        block
    }

    fn snapshot(&self, now: u64) -> StatusSnapshot {
        let initializing = self
            .table
            .iter()
            .filter(|r| r.status.state == NodeState::Init && r.seen != 0)
            .map(|r| r.node_id())
            .collect();

        let visible = self
            .table
            .iter()
            .filter(|r| r.state.is_online() || r.node_id() == self.my_id)
            .map(|r| r.node_id())
            .collect();

        let quorate = match self.master.and_then(|m| self.table.get(m)) {
            Some(record) => record.status.master_mask.iter().collect(),
            None => Vec::new(),
        };

        let records = if self.config.debug {
            Some(
                self.table
                    .iter()
                    .map(|r| RecordSnapshot {
                        node_id: r.node_id(),
                        incarnation: r.incarnation,
                        evil_incarnation: r.evil_incarnation,
                        last_seen: r.last_seen,
                        misses: r.misses,
                        seen: r.seen,
                        msg: r.msg,
                        last_msg: r.last_msg,
                        state: r.state,
                    })
                    .collect(),
            )
        } else {
            None
        };

        StatusSnapshot {
            now,
            node_id: self.my_id,
            score: self.score.score,
            score_req: self.score_req,
            score_max: self.score.max_score,
            state: self.status,
            initializing,
            visible,
            master: self.master,
            quorate,
            records,
        }
    }
}

impl StateMachine for QuorumNode {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Start { now } => self.start(now),
            Event::Tick {
                now,
                slots,
                score,
                members,
            } => match self.phase {
                Phase::Idle => {
                    warn!("tick before start; ignoring");
                    Vec::new()
                }
                Phase::Init { .. } => self.init_tick(now, &slots, score),
                Phase::Running => self.running_tick(now, &slots, score, &members),
            },
            Event::Shutdown { now } => self.logout(now),
        }
    }
}

/// The master's quorum grant: every node we can see that the membership
/// service also reports as a member.
fn intersect_members(mask: &NodeMask, members: &[MemberNode]) -> NodeMask {
    let mut granted = NodeMask::EMPTY;
    for member in members {
        if member.is_member && mask.contains(member.id) {
            granted.set(member.id);
        }
    }
    granted
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: NodeId = NodeId(1);

    fn config() -> QuorumConfig {
        QuorumConfig::new()
            .with_interval(1)
            .with_tko(3)
            .with_tko_up(2)
            .with_master_wait(2)
            .with_upgrade_wait(2)
            .normalized()
    }

    fn node() -> QuorumNode {
        QuorumNode::new(ME, 0xabc, config())
    }

    fn empty_slots() -> Vec<SlotRead> {
        (0..qdisk_types::MAX_NODES)
            .map(|slot| SlotRead { slot, block: None })
            .collect()
    }

    fn tick(now: u64) -> Event {
        Event::Tick {
            now,
            slots: empty_slots(),
            score: ScoreReading {
                score: 1,
                max_score: 1,
            },
            members: vec![MemberNode {
                id: ME,
                is_member: true,
            }],
        }
    }

    fn tick_with_score(now: u64, score: i32, max_score: i32) -> Event {
        Event::Tick {
            now,
            slots: empty_slots(),
            score: ScoreReading { score, max_score },
            members: Vec::new(),
        }
    }

    fn own_write(actions: &[Action]) -> &StatusBlock {
        actions
            .iter()
            .find_map(|a| match a {
                Action::WriteOwnStatus { block } => Some(block),
                _ => None,
            })
            .expect("tick should write our own block")
    }

    /// Drive a fresh node through start + init into the running phase.
    fn started_node() -> (QuorumNode, u64) {
        let mut node = node();
        node.handle(Event::Start { now: 100 });
        let tko = node.config().tko as u64;
        for i in 0..tko {
            node.handle(tick(101 + i));
        }
        (node, 101 + tko)
    }

    #[test]
    fn start_writes_init_block() {
        let mut node = node();
        let actions = node.handle(Event::Start { now: 100 });
        let block = own_write(&actions);
        assert_eq!(block.state, NodeState::Init);
        assert_eq!(block.node_id, ME);
        assert_eq!(block.updatenode, ME.0);
        assert_eq!(block.incarnation, 0xabc);
        assert_eq!(node.status(), NodeState::Init);
    }

    #[test]
    fn init_phase_lasts_tko_ticks_then_registers() {
        let mut node = node();
        node.handle(Event::Start { now: 100 });

        let tko = node.config().tko;
        for i in 0..tko - 1 {
            let actions = node.handle(tick(101 + i as u64));
            assert!(
                !actions
                    .iter()
                    .any(|a| matches!(a, Action::RegisterQuorumDevice { .. })),
                "must not register before init completes"
            );
            assert_eq!(own_write(&actions).state, NodeState::Init);
        }

        let actions = node.handle(tick(200));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::RegisterQuorumDevice { votes: 1 })));
        assert_eq!(node.status(), NodeState::None);
    }

    #[test]
    fn no_bid_during_init_or_upgrade_wait() {
        let (mut node, mut now) = started_node();

        // First running tick upgrades to Run and arms the cooldown.
        let actions = node.handle(tick(now));
        assert_eq!(node.status(), NodeState::Run);
        assert_eq!(own_write(&actions).msg, MessageKind::None);

        // Cooldown ticks: still no bid.
        now += 1;
        let actions = node.handle(tick(now));
        assert_eq!(own_write(&actions).msg, MessageKind::None);

        now += 1;
        let actions = node.handle(tick(now));
        assert_eq!(own_write(&actions).msg, MessageKind::Bid);
    }

    #[test]
    fn lone_node_promotes_after_master_wait() {
        let (mut node, mut now) = started_node();

        // Upgrade, cooldown (2), bid, then age the bid to master_wait (3).
        let mut master_tick = None;
        for i in 0..8 {
            node.handle(tick(now));
            now += 1;
            if node.is_master() {
                master_tick = Some(i);
                break;
            }
        }
        // upgrade at tick 0, bid at tick 2, promotion once bid_age hits 3.
        assert_eq!(master_tick, Some(4));
        assert_eq!(node.master(), Some(ME));

        // The following tick polls the quorum device as master.
        let actions = node.handle(tick(now));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::PollQuorumDevice { available: true })));
        let block = own_write(&actions);
        assert_eq!(block.state, NodeState::Master);
        assert!(block.master_mask.contains(ME));
    }

    #[test]
    fn score_collapse_downgrades_and_polls_unavailable() {
        let (mut node, mut now) = started_node();
        while !node.is_master() {
            node.handle(tick(now));
            now += 1;
        }

        let actions = node.handle(tick_with_score(now, 0, 1));
        assert_eq!(node.status(), NodeState::None);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::PollQuorumDevice { available: false })));
        assert!(actions.iter().any(
            |a| matches!(a, Action::Reboot { reason } if *reason == RebootReason::ScoreLost)
        ));
        let block = own_write(&actions);
        assert_eq!(block.state, NodeState::None);
        assert!(!block.node_mask.contains(ME));
    }

    #[test]
    fn score_collapse_without_reboot_flag_stays_up() {
        let mut config = config();
        config.reboot = false;
        let mut node = QuorumNode::new(ME, 0xabc, config);
        node.handle(Event::Start { now: 100 });
        for i in 0..3 {
            node.handle(tick(101 + i));
        }
        node.handle(tick(104));
        assert_eq!(node.status(), NodeState::Run);

        let actions = node.handle(tick_with_score(105, 0, 1));
        assert!(!actions.iter().any(|a| matches!(a, Action::Reboot { .. })));
        assert_eq!(node.status(), NodeState::None);

        // Second low-score tick: already down, nothing new to signal.
        let actions = node.handle(tick_with_score(106, 0, 1));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::PollQuorumDevice { .. })));
    }

    #[test]
    fn eviction_written_into_our_slot_reboots() {
        let (mut node, now) = started_node();

        let mut slots = empty_slots();
        let mut block = StatusBlock::empty(ME);
        block.state = NodeState::Evict;
        block.updatenode = 3;
        slots[ME.slot()].block = Some(block);

        let actions = node.handle(Event::Tick {
            now,
            slots,
            score: ScoreReading {
                score: 1,
                max_score: 1,
            },
            members: Vec::new(),
        });
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            actions[0],
            Action::Reboot {
                reason: RebootReason::Fenced
            }
        ));
    }

    #[test]
    fn unexpected_write_into_our_slot_halts() {
        let (mut node, now) = started_node();

        let mut slots = empty_slots();
        let mut block = StatusBlock::empty(ME);
        block.state = NodeState::Run;
        block.updatenode = 3;
        slots[ME.slot()].block = Some(block);

        let actions = node.handle(Event::Tick {
            now,
            slots,
            score: ScoreReading {
                score: 1,
                max_score: 1,
            },
            members: Vec::new(),
        });
        assert!(actions.iter().any(|a| matches!(a, Action::Halt { .. })));
        // The tick still completes: our own block is written afterwards.
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::WriteOwnStatus { .. })));
    }

    #[test]
    fn seq_advances_whenever_the_message_changes() {
        let (mut node, mut now) = started_node();

        let mut writes = Vec::new();
        for _ in 0..8 {
            let actions = node.handle(tick(now));
            writes.push(*own_write(&actions));
            now += 1;
        }

        for pair in writes.windows(2) {
            assert!(pair[1].seq >= pair[0].seq, "seq must never decrease");
            if pair[1].msg != pair[0].msg {
                assert!(
                    pair[1].seq > pair[0].seq,
                    "seq must advance when the message changes"
                );
            }
        }
    }

    #[test]
    fn shutdown_writes_logout_block_and_unregisters() {
        let (mut node, now) = started_node();
        node.handle(tick(now));

        let actions = node.handle(Event::Shutdown { now: now + 1 });
        assert_eq!(actions.len(), 2);
        let block = own_write(&actions);
        assert_eq!(block.state, NodeState::None);
        assert!(matches!(actions[1], Action::UnregisterQuorumDevice));
    }

    #[test]
    fn shutdown_during_init_is_silent() {
        let mut node = node();
        node.handle(Event::Start { now: 100 });
        node.handle(tick(101));
        let actions = node.handle(Event::Shutdown { now: 102 });
        assert!(actions.is_empty());
    }
}
