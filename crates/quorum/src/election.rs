//! Elector: master discovery, bidding, and vote arbitration.

use crate::NodeTable;
use qdisk_types::{DiskMessage, MessageKind, NodeId, NodeState};
use tracing::debug;

/// Result of a master-discovery walk over the node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterView {
    /// The elected master, if any. A peer claiming mastership counts only
    /// while we believe it is online; failing that, our own master status
    /// names us.
    pub master: Option<NodeId>,
    /// Lowest node id among peers we believe online, ourselves included.
    pub low_id: NodeId,
    /// Number of *peers* currently claiming mastership. Our own claim is
    /// not counted, so during a split-brain each master sees exactly the
    /// other side and both abdicate.
    pub master_count: u32,
}

/// Walk the table computing the current [`MasterView`].
///
/// A slot whose block claims `Master` while our belief says it is not
/// online is a dead master and is ignored.
pub fn find_master(table: &NodeTable, my_id: NodeId, my_status: NodeState) -> MasterView {
    let mut master = None;
    let mut master_count = 0;
    let mut low_id = my_id;

    for record in table.iter() {
        let node = record.node_id();
        if node == my_id {
            continue;
        }

        if record.state.is_online() && record.status.state == NodeState::Master {
            if master.is_none() {
                master = Some(node);
            }
            master_count += 1;
            continue;
        }

        if record.status.state == NodeState::Master && !record.state.is_online() {
            debug!(%node, "node is marked master, but is dead");
            continue;
        }

        if !record.state.is_online() {
            continue;
        }

        if node < low_id {
            low_id = node;
        }
    }

    if master.is_none() && my_status == NodeState::Master {
        master = Some(my_id);
    }

    MasterView {
        master,
        low_id,
        master_count,
    }
}

/// Vote for a master if one put a bid in: scan for bidding peers with an
/// id lower than ours and stash an `Ack` for the lowest into `msg`. The
/// ack echoes the bid's sequence number.
pub fn do_vote(table: &NodeTable, my_id: NodeId, msg: &mut DiskMessage) {
    for record in table.iter() {
        if record.state != NodeState::Run {
            continue;
        }

        if record.status.msg == MessageKind::Bid && record.node_id() < my_id {
            // Slots are in id order, so the first hit is the lowest bidder.
            msg.kind = MessageKind::Ack;
            msg.arg = record.node_id().0;
            msg.seq = record.status.seq;
            return;
        }
    }
}

/// Outcome of tallying the votes on our own pending bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Every running peer acked us: the bid succeeds (once it is old
    /// enough).
    AllAcked,
    /// Someone nacked us: rescind the bid.
    Nacked,
    /// A peer with a lower id is also bidding: rescind and vote for it
    /// (the vote has been stashed into `msg`).
    LowerBidder,
    /// Votes are still outstanding: keep the bid and wait another tick.
    Waiting,
}

/// Tally acks and nacks targeting our pending bid.
///
/// A lower-id bidder takes precedence over waiting (we rescind in its
/// favor), but unanimous acks and nacks are checked first, mirroring the
/// original arbitration order.
pub fn check_votes(table: &NodeTable, my_id: NodeId, msg: &mut DiskMessage) -> VoteOutcome {
    let mut running = 0u32;
    let mut acks = 0u32;
    let mut nacks = 0u32;
    let mut low_id = my_id;

    for record in table.iter() {
        if record.state.is_running() {
            running += 1;
        } else {
            continue;
        }

        if record.status.msg == MessageKind::Ack && record.status.arg == my_id.0 {
            acks += 1;
        }

        if record.status.msg == MessageKind::Nack && record.status.arg == my_id.0 {
            nacks += 1;
        }

        // A lower-id bidder wins the tie: pre-stage our vote for it.
        if record.status.msg == MessageKind::Bid && record.node_id() < low_id {
            low_id = record.node_id();
            msg.kind = MessageKind::Ack;
            msg.arg = record.node_id().0;
            msg.seq = record.status.seq;
        }
    }

    if acks == running {
        return VoteOutcome::AllAcked;
    }
    if nacks > 0 {
        return VoteOutcome::Nacked;
    }
    if low_id != my_id {
        return VoteOutcome::LowerBidder;
    }
    VoteOutcome::Waiting
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdisk_types::StatusBlock;

    const ME: NodeId = NodeId(2);

    fn table() -> NodeTable {
        NodeTable::new(100)
    }

    fn put_peer(table: &mut NodeTable, id: NodeId, belief: NodeState, reported: NodeState) {
        let record = table.slot_mut(id.slot());
        let mut block = StatusBlock::empty(id);
        block.state = reported;
        record.status = block;
        record.state = belief;
    }

    fn put_message(table: &mut NodeTable, id: NodeId, msg: MessageKind, arg: u32, seq: u32) {
        let record = table.slot_mut(id.slot());
        record.status.msg = msg;
        record.status.arg = arg;
        record.status.seq = seq;
    }

    #[test]
    fn no_master_when_table_is_empty() {
        let view = find_master(&table(), ME, NodeState::Run);
        assert_eq!(view.master, None);
        assert_eq!(view.low_id, ME);
        assert_eq!(view.master_count, 0);
    }

    #[test]
    fn live_peer_master_is_found() {
        let mut table = table();
        put_peer(&mut table, NodeId(5), NodeState::Master, NodeState::Master);

        let view = find_master(&table, ME, NodeState::Run);
        assert_eq!(view.master, Some(NodeId(5)));
        assert_eq!(view.master_count, 1);
    }

    #[test]
    fn dead_master_is_ignored() {
        let mut table = table();
        put_peer(&mut table, NodeId(5), NodeState::Evict, NodeState::Master);

        let view = find_master(&table, ME, NodeState::Run);
        assert_eq!(view.master, None);
        assert_eq!(view.master_count, 0);
    }

    #[test]
    fn own_mastership_reported_when_no_peer_claims() {
        let view = find_master(&table(), ME, NodeState::Master);
        assert_eq!(view.master, Some(ME));
        assert_eq!(view.master_count, 0);
    }

    #[test]
    fn peer_master_shadows_our_own_claim() {
        let mut table = table();
        put_peer(&mut table, NodeId(5), NodeState::Master, NodeState::Master);

        let view = find_master(&table, ME, NodeState::Master);
        assert_eq!(view.master, Some(NodeId(5)));
        assert_eq!(view.master_count, 1);
    }

    #[test]
    fn low_id_covers_online_peers_and_self() {
        let mut table = table();
        put_peer(&mut table, NodeId(7), NodeState::Run, NodeState::Run);
        let view = find_master(&table, ME, NodeState::Run);
        assert_eq!(view.low_id, ME);

        put_peer(&mut table, NodeId(1), NodeState::Run, NodeState::Run);
        let view = find_master(&table, ME, NodeState::Run);
        assert_eq!(view.low_id, NodeId(1));
    }

    #[test]
    fn initializing_peer_does_not_move_low_id() {
        let mut table = table();
        put_peer(&mut table, NodeId(1), NodeState::Init, NodeState::Init);
        let view = find_master(&table, ME, NodeState::Run);
        assert_eq!(view.low_id, ME);
    }

    #[test]
    fn vote_goes_to_lowest_bidder_below_us() {
        let mut table = table();
        put_peer(&mut table, NodeId(1), NodeState::Run, NodeState::Run);
        put_message(&mut table, NodeId(1), MessageKind::Bid, 0, 9);

        let me = NodeId(3);
        let mut msg = DiskMessage::default();
        do_vote(&table, me, &mut msg);
        assert_eq!(msg.kind, MessageKind::Ack);
        assert_eq!(msg.arg, 1);
        assert_eq!(msg.seq, 9);
    }

    #[test]
    fn no_vote_for_higher_id_bidders() {
        let mut table = table();
        put_peer(&mut table, NodeId(5), NodeState::Run, NodeState::Run);
        put_message(&mut table, NodeId(5), MessageKind::Bid, 0, 4);

        let mut msg = DiskMessage::default();
        do_vote(&table, ME, &mut msg);
        assert_eq!(msg.kind, MessageKind::None);
    }

    #[test]
    fn no_vote_for_non_running_bidders() {
        let mut table = table();
        put_peer(&mut table, NodeId(1), NodeState::Init, NodeState::Init);
        put_message(&mut table, NodeId(1), MessageKind::Bid, 0, 4);

        let mut msg = DiskMessage::default();
        do_vote(&table, ME, &mut msg);
        assert_eq!(msg.kind, MessageKind::None);
    }

    #[test]
    fn unanimous_acks_win() {
        let mut table = table();
        put_peer(&mut table, NodeId(3), NodeState::Run, NodeState::Run);
        put_message(&mut table, NodeId(3), MessageKind::Ack, ME.0, 5);
        put_peer(&mut table, NodeId(4), NodeState::Run, NodeState::Run);
        put_message(&mut table, NodeId(4), MessageKind::Ack, ME.0, 5);

        let mut msg = DiskMessage::default();
        assert_eq!(check_votes(&table, ME, &mut msg), VoteOutcome::AllAcked);
    }

    #[test]
    fn missing_ack_means_waiting() {
        let mut table = table();
        put_peer(&mut table, NodeId(3), NodeState::Run, NodeState::Run);
        put_message(&mut table, NodeId(3), MessageKind::Ack, ME.0, 5);
        put_peer(&mut table, NodeId(4), NodeState::Run, NodeState::Run);

        let mut msg = DiskMessage::default();
        assert_eq!(check_votes(&table, ME, &mut msg), VoteOutcome::Waiting);
    }

    #[test]
    fn ack_for_someone_else_does_not_count() {
        let mut table = table();
        put_peer(&mut table, NodeId(3), NodeState::Run, NodeState::Run);
        put_message(&mut table, NodeId(3), MessageKind::Ack, 9, 5);

        let mut msg = DiskMessage::default();
        assert_eq!(check_votes(&table, ME, &mut msg), VoteOutcome::Waiting);
    }

    #[test]
    fn any_nack_rescinds() {
        let mut table = table();
        put_peer(&mut table, NodeId(3), NodeState::Run, NodeState::Run);
        put_message(&mut table, NodeId(3), MessageKind::Nack, ME.0, 5);

        let mut msg = DiskMessage::default();
        assert_eq!(check_votes(&table, ME, &mut msg), VoteOutcome::Nacked);
    }

    #[test]
    fn lower_bidder_rescinds_and_stashes_vote() {
        let mut table = table();
        put_peer(&mut table, NodeId(1), NodeState::Run, NodeState::Run);
        put_message(&mut table, NodeId(1), MessageKind::Bid, 0, 7);

        let mut msg = DiskMessage {
            kind: MessageKind::Bid,
            arg: 0,
            seq: 3,
        };
        assert_eq!(check_votes(&table, ME, &mut msg), VoteOutcome::LowerBidder);
        assert_eq!(msg.kind, MessageKind::Ack);
        assert_eq!(msg.arg, 1);
        assert_eq!(msg.seq, 7);
    }

    #[test]
    fn alone_with_no_peers_all_acked() {
        // A single node has zero running peers, so the (empty) ack set is
        // unanimous; promotion is then gated by bid age alone.
        let mut msg = DiskMessage::default();
        assert_eq!(check_votes(&table(), ME, &mut msg), VoteOutcome::AllAcked);
    }
}
