// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A [ClusterNode] is the registry's record of one registered peer: its canonical
//! address, the set of services it provides and its latest health [NodeStatus].
//!
//! Records are only ever created and mutated by the [crate::ClusterRegistry]. The
//! address of a record never changes, while its status is replaced atomically by
//! health-check completions (see [check]) so readers always observe a complete status.
//!
//! Once the registry drops a record (unregistered, or replaced by a registration with
//! other services) the record is retired for good, and no service index accepts it
//! anymore.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub mod check;


/// The health-check state machine of a node.
///
/// ```text
/// undetermined --(200 + echoed token)--> online
/// any          --(connect failure / timeout)--> unreachable
/// any          --(bad status, missing or wrong token)--> unexpected_response
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// The node answered the latest check correctly
    Online,
    /// The node could not be reached by the latest check
    Unreachable,
    /// The node was reached but answered the latest check incorrectly
    UnexpectedResponse,
    /// The node has not been checked yet
    Undetermined,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::UnexpectedResponse => write!(f, "unexpected_response"),
            Self::Undetermined => write!(f, "undetermined"),
        }
    }
}

/// The latest known health status of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Derived flag, `true` iff `state` is [NodeState::Online]
    pub online: bool,
    /// Unix timestamp (milliseconds) at which the status was observed
    pub latest_check: u64,
    /// The health-check state
    pub state: NodeState,
    /// Round-trip time of the health check in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    /// Why the node isn't online, if a check failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeStatus {
    /// Build a new status, deriving the `online` flag from `state`
    pub fn new(latest_check: u64, state: NodeState, latency: Option<u64>, error: Option<String>) -> Self {
        Self {
            online: state == NodeState::Online,
            latest_check,
            state,
            latency,
            error,
        }
    }

    /// The status of a node which hasn't been checked yet
    pub fn undetermined() -> Self {
        Self::new(0, NodeState::Undetermined, None, None)
    }
}

/// The current time as unix milliseconds
pub(crate) fn now_millis() -> u64 {
    millis(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default(),
    )
}

/// Whole milliseconds of `duration`, saturating at [u64::MAX]
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// One registered peer of the cluster.
///
/// Identity is the canonical address: the registry never holds two records with the
/// same address. A re-registration with a different service set replaces the record
/// with a new one, so a [ClusterNode]'s service set is fixed for its lifetime.
#[derive(Debug)]
pub struct ClusterNode {
    address: String,
    services: BTreeSet<String>,
    check_url: String,
    status: ArcSwap<NodeStatus>,
    retired: AtomicBool,
}

impl ClusterNode {
    /// Create a new, undetermined, record
    ///
    /// * `address` - The canonical address (see [crate::address::normalize])
    /// * `services` - The services the node provides
    pub(crate) fn new(address: String, services: BTreeSet<String>) -> Self {
        let check_url = format!("{}{}", address, crate::CLUSTER_PATH);
        Self {
            address,
            services,
            check_url,
            status: ArcSwap::from_pointee(NodeStatus::undetermined()),
            retired: AtomicBool::new(false),
        }
    }

    /// The node's canonical `scheme://host:port` address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The services provided by the node
    pub fn services(&self) -> &BTreeSet<String> {
        &self.services
    }

    /// The url the health checks are sent to
    pub fn check_url(&self) -> &str {
        &self.check_url
    }

    /// The latest status of the node
    pub fn status(&self) -> Arc<NodeStatus> {
        self.status.load_full()
    }

    /// Whether the latest check found the node online
    pub fn is_online(&self) -> bool {
        self.status.load().online
    }

    /// Whether the registry dropped this record
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub(crate) fn set_status(&self, status: NodeStatus) {
        self.status.store(Arc::new(status));
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }
}
