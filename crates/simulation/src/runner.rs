//! The deterministic simulation runner.

use crate::SimDisk;
use qdisk_core::{
    Action, Event, MemberNode, RebootReason, ScoreReading, SlotRead, StateMachine, StatusSnapshot,
};
use qdisk_quorum::{QuorumConfig, QuorumNode};
use qdisk_types::{NodeId, NodeState, MAX_NODES};
use tracing::{debug, info};

/// Why a simulated node stopped participating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFate {
    /// The node executed a reboot action.
    Rebooted(RebootReason),
    /// The node executed a halt action.
    Halted,
}

struct SimNode {
    node: QuorumNode,
    /// Ticking this round. Crashed or fenced nodes stop ticking but keep
    /// their in-memory state, so a resume models a process that was
    /// merely wedged.
    running: bool,
    fate: Option<NodeFate>,
    score: ScoreReading,
    member: bool,
    last_snapshot: Option<StatusSnapshot>,
}

/// Runs a cluster of quorum state machines over a shared [`SimDisk`].
///
/// Each call to [`SimulationRunner::tick`] advances the simulated clock by
/// one interval and runs every live node once. All reads within a round
/// observe the disk as the previous round left it; writes land in node-id
/// order.
pub struct SimulationRunner {
    config: QuorumConfig,
    now: u64,
    round: u64,
    disk: SimDisk,
    nodes: Vec<SimNode>,
    polls: Vec<(u64, NodeId, bool)>,
    kills: Vec<(u64, NodeId, NodeId)>,
    registrations: Vec<(NodeId, u32)>,
}

impl SimulationRunner {
    /// Create a cluster of `num_nodes` nodes (ids `1..=num_nodes`), all
    /// stopped. Incarnations are deterministic per node id.
    pub fn new(num_nodes: usize, config: QuorumConfig) -> Self {
        assert!(num_nodes >= 1 && num_nodes <= MAX_NODES);
        let config = config.normalized();

        let nodes = (1..=num_nodes)
            .map(|id| SimNode {
                node: QuorumNode::new(NodeId(id as u32), 0x100 + id as u64, config.clone()),
                running: false,
                fate: None,
                score: ScoreReading {
                    score: 1,
                    max_score: 1,
                },
                member: true,
                last_snapshot: None,
            })
            .collect();

        info!(num_nodes, "created simulation runner");

        SimulationRunner {
            config,
            now: 100,
            round: 0,
            disk: SimDisk::new(),
            nodes,
            polls: Vec::new(),
            kills: Vec::new(),
            registrations: Vec::new(),
        }
    }

    /// Start every node at the current simulated time.
    pub fn start_all(&mut self) {
        for id in self.ids() {
            self.start(id);
        }
    }

    /// Start one node: it writes its first `Init` block and begins
    /// ticking.
    pub fn start(&mut self, id: NodeId) {
        let now = self.now;
        let sim = self.sim_node_mut(id);
        sim.running = true;
        sim.fate = None;
        let actions = sim.node.handle(Event::Start { now });
        self.apply(id, actions);
    }

    /// Advance the clock one interval and run every live node once.
    pub fn tick(&mut self) {
        self.now += self.config.interval;
        self.round += 1;

        // Snapshot phase: every node reads the disk as the previous round
        // left it, so peers whose ticks overlap see each other's previous
        // write, never this round's.
        let reads: Vec<Option<Vec<SlotRead>>> = self
            .ids()
            .into_iter()
            .map(|id| {
                let sim = self.sim_node(id);
                if sim.running && sim.fate.is_none() {
                    Some(self.build_slots(id))
                } else {
                    None
                }
            })
            .collect();

        let members = self.members();
        for (idx, slots) in reads.into_iter().enumerate() {
            let Some(slots) = slots else { continue };
            let id = NodeId(idx as u32 + 1);
            let event = Event::Tick {
                now: self.now,
                slots,
                score: self.nodes[idx].score,
                members: members.clone(),
            };
            let actions = self.nodes[idx].node.handle(event);
            self.apply(id, actions);
        }
    }

    /// Run `n` ticks.
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Run ticks until `predicate` holds, failing after `max` ticks.
    pub fn run_until(&mut self, max: u64, mut predicate: impl FnMut(&Self) -> bool) {
        for _ in 0..max {
            if predicate(self) {
                return;
            }
            self.tick();
        }
        assert!(predicate(self), "condition not reached within {max} ticks");
    }

    /// Deliver a clean shutdown to one node.
    pub fn shutdown(&mut self, id: NodeId) {
        let now = self.now;
        let sim = self.sim_node_mut(id);
        let actions = sim.node.handle(Event::Shutdown { now });
        sim.running = false;
        self.apply(id, actions);
    }

    /// Stop a node abruptly: it keeps its state but stops ticking (and
    /// therefore stops writing).
    pub fn crash(&mut self, id: NodeId) {
        debug!(node = %id, "crash");
        self.sim_node_mut(id).running = false;
    }

    /// Resume a crashed node with its state and incarnation intact, as if
    /// the process had been wedged rather than dead.
    pub fn resume(&mut self, id: NodeId) {
        debug!(node = %id, "resume");
        let sim = self.sim_node_mut(id);
        assert!(sim.fate.is_none(), "cannot resume a fenced node");
        sim.running = true;
    }

    /// Replace a node with a fresh boot: new state machine, new
    /// incarnation, started immediately.
    pub fn restart(&mut self, id: NodeId) {
        debug!(node = %id, "restart with fresh incarnation");
        let incarnation = 0x1000 + self.round * 0x10 + id.0 as u64;
        let config = self.config.clone();
        let sim = self.sim_node_mut(id);
        sim.node = QuorumNode::new(id, incarnation, config);
        sim.fate = None;
        self.start(id);
    }

    /// Set one node's heuristic score.
    pub fn set_score(&mut self, id: NodeId, score: i32, max_score: i32) {
        self.sim_node_mut(id).score = ScoreReading { score, max_score };
    }

    /// Fail all reads between `a` and `b`, both directions.
    pub fn partition(&mut self, a: NodeId, b: NodeId) {
        self.disk.fail_reads(a, b);
        self.disk.fail_reads(b, a);
    }

    /// Heal a [`SimulationRunner::partition`].
    pub fn heal(&mut self, a: NodeId, b: NodeId) {
        self.disk.heal_reads(a, b);
        self.disk.heal_reads(b, a);
    }

    /// Make a node unable to read its own slot (it keeps writing); this
    /// is how a node misses its own eviction notice.
    pub fn fail_own_slot_reads(&mut self, id: NodeId) {
        self.disk.fail_reads(id, id);
    }

    /// Undo [`SimulationRunner::fail_own_slot_reads`].
    pub fn heal_own_slot_reads(&mut self, id: NodeId) {
        self.disk.heal_reads(id, id);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════

    /// All node ids in the cluster.
    pub fn ids(&self) -> Vec<NodeId> {
        (1..=self.nodes.len()).map(|id| NodeId(id as u32)).collect()
    }

    /// Current simulated time (seconds).
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Rounds executed so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// The shared disk.
    pub fn disk(&self) -> &SimDisk {
        &self.disk
    }

    /// A node's state machine, for inspection.
    pub fn node(&self, id: NodeId) -> &QuorumNode {
        &self.sim_node(id).node
    }

    /// A node's own reported state.
    pub fn status(&self, id: NodeId) -> NodeState {
        self.sim_node(id).node.status()
    }

    /// The master a node currently believes in.
    pub fn master_of(&self, id: NodeId) -> Option<NodeId> {
        self.sim_node(id).node.master()
    }

    /// Every live (ticking) node currently claiming the master role. A
    /// crashed node's frozen belief does not count; it is not writing.
    pub fn masters(&self) -> Vec<NodeId> {
        self.ids()
            .into_iter()
            .filter(|id| {
                let sim = self.sim_node(*id);
                sim.running && sim.fate.is_none() && sim.node.is_master()
            })
            .collect()
    }

    /// How a node was fenced, if it was.
    pub fn fate(&self, id: NodeId) -> Option<&NodeFate> {
        self.sim_node(id).fate.as_ref()
    }

    /// All quorum-device votes cast, as (round, node, available).
    pub fn polls(&self) -> &[(u64, NodeId, bool)] {
        &self.polls
    }

    /// The last vote a node cast.
    pub fn last_poll(&self, id: NodeId) -> Option<bool> {
        self.polls
            .iter()
            .rev()
            .find(|(_, node, _)| *node == id)
            .map(|(_, _, available)| *available)
    }

    /// All kill requests, as (round, requester, target).
    pub fn kills(&self) -> &[(u64, NodeId, NodeId)] {
        &self.kills
    }

    /// Quorum-device registrations, as (node, votes).
    pub fn registrations(&self) -> &[(NodeId, u32)] {
        &self.registrations
    }

    /// The last status snapshot a node emitted.
    pub fn snapshot(&self, id: NodeId) -> Option<&StatusSnapshot> {
        self.sim_node(id).last_snapshot.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════

    fn sim_node(&self, id: NodeId) -> &SimNode {
        &self.nodes[id.slot()]
    }

    fn sim_node_mut(&mut self, id: NodeId) -> &mut SimNode {
        &mut self.nodes[id.slot()]
    }

    fn members(&self) -> Vec<MemberNode> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(slot, sim)| MemberNode {
                id: NodeId::from_slot(slot),
                is_member: sim.member,
            })
            .collect()
    }

    fn build_slots(&self, reader: NodeId) -> Vec<SlotRead> {
        (0..MAX_NODES)
            .map(|slot| SlotRead {
                slot,
                block: self.disk.read(reader, NodeId::from_slot(slot)),
            })
            .collect()
    }

    fn apply(&mut self, id: NodeId, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::WriteOwnStatus { block } => {
                    self.disk.write(id, block.node_id, &block);
                }
                Action::WriteEviction { node, block } => {
                    self.disk.write(id, node, &block);
                }
                Action::PollQuorumDevice { available } => {
                    self.polls.push((self.round, id, available));
                }
                Action::KillNode { node } => {
                    self.kills.push((self.round, id, node));
                }
                Action::RegisterQuorumDevice { votes } => {
                    self.registrations.push((id, votes));
                }
                Action::UnregisterQuorumDevice => {}
                Action::EmitStatus { snapshot } => {
                    self.sim_node_mut(id).last_snapshot = Some(*snapshot);
                }
                Action::Reboot { reason } => {
                    info!(node = %id, ?reason, "node fenced: reboot");
                    let sim = self.sim_node_mut(id);
                    sim.fate = Some(NodeFate::Rebooted(reason));
                    sim.running = false;
                }
                Action::Halt { reason } => {
                    info!(node = %id, reason, "node fenced: halt");
                    let sim = self.sim_node_mut(id);
                    sim.fate = Some(NodeFate::Halted);
                    sim.running = false;
                }
            }
        }
    }
}
