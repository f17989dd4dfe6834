//! End-to-end test of the production pace loop.
//!
//! Drives a real [`PaceRunner`] - tokio pacing, action execution, clean
//! shutdown - against an in-memory quorum disk and the static membership
//! implementation. Tokio's paused clock makes the 1-second pacing run
//! instantly while keeping the loop's sleep/shutdown plumbing honest.

use qdisk_core::MemberNode;
use qdisk_disk::{DiskError, QuorumDisk};
use qdisk_production::{
    FixedScore, Membership, MembershipError, PaceRunner, StaticMembership,
};
use qdisk_quorum::{QuorumConfig, QuorumNode};
use qdisk_simulation::SimDisk;
use qdisk_types::{NodeId, NodeState, StatusBlock};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// [`QuorumDisk`] adapter over the simulation's in-memory disk, shared
/// with the test for post-run assertions.
#[derive(Clone)]
struct MemDisk {
    inner: Arc<Mutex<SimDisk>>,
    reader: NodeId,
}

impl MemDisk {
    fn new(reader: NodeId) -> Self {
        MemDisk {
            inner: Arc::new(Mutex::new(SimDisk::new())),
            reader,
        }
    }
}

impl QuorumDisk for MemDisk {
    fn block_size(&self) -> u32 {
        qdisk_disk::MIN_BLOCK_SIZE
    }

    fn read_block(&mut self, node: NodeId) -> Result<StatusBlock, DiskError> {
        self.inner
            .lock()
            .unwrap()
            .read(self.reader, node)
            .ok_or_else(|| DiskError::Io(std::io::Error::other("injected read failure")))
    }

    fn write_block(&mut self, node: NodeId, block: &StatusBlock) -> Result<(), DiskError> {
        self.inner.lock().unwrap().write(self.reader, node, block);
        Ok(())
    }
}

/// Shares a [`StaticMembership`] with the test for post-run assertions.
#[derive(Clone)]
struct SharedMembership(Arc<Mutex<StaticMembership>>);

impl Membership for SharedMembership {
    fn self_id(&self) -> NodeId {
        self.0.lock().unwrap().self_id()
    }

    fn nodes(&mut self) -> Result<Vec<MemberNode>, MembershipError> {
        self.0.lock().unwrap().nodes()
    }

    fn poll_quorum_device(&mut self, available: bool) -> Result<(), MembershipError> {
        self.0.lock().unwrap().poll_quorum_device(available)
    }

    fn kill_node(&mut self, node: NodeId) -> Result<(), MembershipError> {
        self.0.lock().unwrap().kill_node(node)
    }

    fn register_quorum_device(&mut self, name: &str, votes: u32) -> Result<(), MembershipError> {
        self.0.lock().unwrap().register_quorum_device(name, votes)
    }

    fn unregister_quorum_device(&mut self) -> Result<(), MembershipError> {
        self.0.lock().unwrap().unregister_quorum_device()
    }

    fn shutdown_cluster(&mut self) -> Result<(), MembershipError> {
        self.0.lock().unwrap().shutdown_cluster()
    }

    fn dispatch(&mut self) -> Result<(), MembershipError> {
        self.0.lock().unwrap().dispatch()
    }
}

#[tokio::test(start_paused = true)]
async fn lone_node_start_to_master_to_clean_shutdown() {
    let my_id = NodeId(1);
    let config = QuorumConfig::new()
        .with_interval(1)
        .with_tko(3)
        .with_tko_up(2)
        .with_master_wait(2)
        .with_upgrade_wait(2)
        .normalized();

    let disk = MemDisk::new(my_id);
    let disk_handle = disk.clone();
    let membership = SharedMembership(Arc::new(Mutex::new(StaticMembership::new(my_id, vec![]))));
    let membership_handle = membership.clone();

    let node = QuorumNode::new(my_id, 0xdead, config);
    let (runner, shutdown) = PaceRunner::new(
        node,
        disk,
        membership,
        FixedScore::full(),
        "/dev/qdisk-test".to_string(),
        None,
    );

    let task = tokio::spawn(runner.run());

    // Enough virtual time for init (3 ticks) plus the election dance.
    tokio::time::sleep(Duration::from_secs(15)).await;
    shutdown.shutdown();
    task.await.expect("runner task").expect("runner result");

    // The node registered, won the election, and voted the device in.
    {
        let membership = membership_handle.0.lock().unwrap();
        assert_eq!(membership.last_poll(), Some(true));
        // Unregistered again during logout.
        assert_eq!(membership.registered_device(), None);
    }

    let disk = disk_handle.inner.lock().unwrap();
    assert!(
        disk.own_writes(my_id)
            .iter()
            .any(|b| b.state == NodeState::Master),
        "the lone node must have become master"
    );

    // Clean shutdown leaves a logout block on disk.
    let last = disk.block(my_id).expect("own slot must decode");
    assert_eq!(last.state, NodeState::None);
    assert_eq!(last.updatenode, my_id.0);
}
