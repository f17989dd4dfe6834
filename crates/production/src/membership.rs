//! The cluster membership service seam.
//!
//! The daemon does not decide cluster quorum itself; it feeds a vote into
//! an external membership service. [`Membership`] is the seam that service
//! is consumed through, and [`StaticMembership`] is the built-in
//! implementation backed by a configured node list, suitable for
//! standalone operation and as the integration point for a real cluster
//! manager.

use qdisk_core::MemberNode;
use qdisk_types::NodeId;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the membership service.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("membership service unavailable: {0}")]
    Unavailable(String),

    #[error("membership service rejected the request: {0}")]
    Rejected(String),
}

/// Operations the daemon consumes from the cluster membership service.
pub trait Membership {
    /// Our own node id as the membership service knows it.
    fn self_id(&self) -> NodeId;

    /// The current node list with membership flags.
    fn nodes(&mut self) -> Result<Vec<MemberNode>, MembershipError>;

    /// Cast (`true`) or withdraw (`false`) our quorum-device vote.
    fn poll_quorum_device(&mut self, available: bool) -> Result<(), MembershipError>;

    /// Ask the service to kill an evicted node.
    fn kill_node(&mut self, node: NodeId) -> Result<(), MembershipError>;

    /// Announce the quorum device and its vote weight.
    fn register_quorum_device(&mut self, name: &str, votes: u32) -> Result<(), MembershipError>;

    /// Withdraw the quorum device on clean shutdown.
    fn unregister_quorum_device(&mut self) -> Result<(), MembershipError>;

    /// Ask the whole cluster to shut down (used when the daemon cannot
    /// start and `stop_cman` is set).
    fn shutdown_cluster(&mut self) -> Result<(), MembershipError>;

    /// Pump the service's pending notifications without blocking. Called
    /// once per tick; a failure halts quorum-disk operations.
    fn dispatch(&mut self) -> Result<(), MembershipError>;
}

/// Membership backed by a configured node list.
///
/// Every configured node is reported as a member; the side-effecting
/// operations are logged. A deployment integrating a real cluster manager
/// implements [`Membership`] against it instead.
#[derive(Debug, Clone)]
pub struct StaticMembership {
    self_id: NodeId,
    members: Vec<NodeId>,
    registered: Option<String>,
    last_poll: Option<bool>,
}

impl StaticMembership {
    pub fn new(self_id: NodeId, mut members: Vec<NodeId>) -> Self {
        if !members.contains(&self_id) {
            members.push(self_id);
        }
        members.sort();
        members.dedup();
        StaticMembership {
            self_id,
            members,
            registered: None,
            last_poll: None,
        }
    }

    /// The device name registered, if any.
    pub fn registered_device(&self) -> Option<&str> {
        self.registered.as_deref()
    }

    /// The last vote cast via [`Membership::poll_quorum_device`].
    pub fn last_poll(&self) -> Option<bool> {
        self.last_poll
    }
}

impl Membership for StaticMembership {
    fn self_id(&self) -> NodeId {
        self.self_id
    }

    fn nodes(&mut self) -> Result<Vec<MemberNode>, MembershipError> {
        Ok(self
            .members
            .iter()
            .map(|id| MemberNode {
                id: *id,
                is_member: true,
            })
            .collect())
    }

    fn poll_quorum_device(&mut self, available: bool) -> Result<(), MembershipError> {
        if self.last_poll != Some(available) {
            info!(available, "quorum device vote changed");
        }
        self.last_poll = Some(available);
        Ok(())
    }

    fn kill_node(&mut self, node: NodeId) -> Result<(), MembershipError> {
        warn!(%node, "kill requested; no cluster manager attached to enforce it");
        Ok(())
    }

    fn register_quorum_device(&mut self, name: &str, votes: u32) -> Result<(), MembershipError> {
        info!(name, votes, "registered quorum device");
        self.registered = Some(name.to_string());
        Ok(())
    }

    fn unregister_quorum_device(&mut self) -> Result<(), MembershipError> {
        info!("unregistered quorum device");
        self.registered = None;
        Ok(())
    }

    fn shutdown_cluster(&mut self) -> Result<(), MembershipError> {
        warn!("cluster shutdown requested; no cluster manager attached to enforce it");
        Ok(())
    }

    fn dispatch(&mut self) -> Result<(), MembershipError> {
        debug!("membership dispatch (no-op)");
        Ok(())
    }
}
