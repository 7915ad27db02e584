// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Per-service partitioning of nodes into active and inactive sets.
//!
//! A [ServiceIndex] holds the nodes providing one service. Mutations happen under a
//! [parking_lot::RwLock] and, when they change membership, publish a new immutable
//! [ServiceSnapshot]. Readers only ever load the current snapshot so they never block
//! and never observe a half-applied transition.
//!
//! Transitions which wouldn't change anything (e.g. marking an already active node as
//! active, the common case under steady polling) are detected under the shared lock
//! and skip both the exclusive lock and the snapshot rebuild.
//!
//! Retired records (see [ClusterNode::is_retired]) are refused by every transition.
//! The check happens under the exclusive lock, so a transition racing with the
//! record's removal either lands before the removal or not at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use rand::seq::SliceRandom;

use crate::ClusterNode;


/// An immutable point-in-time view of a [ServiceIndex]. Both lists are sorted
/// by address
#[derive(Debug, Default)]
pub struct ServiceSnapshot {
    /// Nodes whose latest check found them online
    pub active: Vec<Arc<ClusterNode>>,
    /// All other nodes providing the service
    pub inactive: Vec<Arc<ClusterNode>>,
}

impl ServiceSnapshot {
    /// The addresses of the active nodes
    pub fn active_addresses(&self) -> Vec<String> {
        self.active.iter().map(|n| n.address().to_string()).collect()
    }

    /// The addresses of the inactive nodes
    pub fn inactive_addresses(&self) -> Vec<String> {
        self.inactive
            .iter()
            .map(|n| n.address().to_string())
            .collect()
    }
}

#[derive(Default)]
struct Partition {
    active: BTreeMap<String, Arc<ClusterNode>>,
    inactive: BTreeMap<String, Arc<ClusterNode>>,
}

impl Partition {
    fn contains(set: &BTreeMap<String, Arc<ClusterNode>>, node: &Arc<ClusterNode>) -> bool {
        set.get(node.address())
            .map(|existing| Arc::ptr_eq(existing, node))
            .unwrap_or(false)
    }

    fn to_snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            active: self.active.values().cloned().collect(),
            inactive: self.inactive.values().cloned().collect(),
        }
    }
}

/// The nodes providing a single service, partitioned by health
pub struct ServiceIndex {
    name: String,
    sets: RwLock<Partition>,
    snapshot: ArcSwap<ServiceSnapshot>,
}

impl std::fmt::Debug for ServiceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("ServiceIndex")
            .field("name", &self.name)
            .field("active", &snapshot.active.len())
            .field("inactive", &snapshot.inactive.len())
            .finish()
    }
}

impl ServiceIndex {
    /// Create a new, empty, index for the service `name`
    pub fn new(name: String) -> Self {
        Self {
            name,
            sets: RwLock::new(Partition::default()),
            snapshot: ArcSwap::from_pointee(ServiceSnapshot::default()),
        }
    }

    /// The service name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current snapshot. Never blocks
    pub fn snapshot(&self) -> Arc<ServiceSnapshot> {
        self.snapshot.load_full()
    }

    /// Whether no node at all is indexed
    pub fn is_empty(&self) -> bool {
        let snapshot = self.snapshot.load();
        snapshot.active.is_empty() && snapshot.inactive.is_empty()
    }

    /// Pick an active node uniformly at random from the current snapshot
    pub fn random_active(&self) -> Option<Arc<ClusterNode>> {
        self.snapshot
            .load()
            .active
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    /// Index a node in the set matching its current `online` flag.
    ///
    /// The flag is read under the index lock, so when concurrent status updates of a
    /// node each call this, the last one to run leaves the node in the set matching
    /// its latest status
    pub fn insert(&self, node: &Arc<ClusterNode>) -> bool {
        self.transition(node, || node.is_online())
    }

    /// Move a node into the active set.
    ///
    /// Returns `true` if the membership changed (and a new snapshot was published),
    /// `false` if it was already there or is retired
    pub fn active(&self, node: &Arc<ClusterNode>) -> bool {
        self.transition(node, || true)
    }

    /// Move a node into the inactive set.
    ///
    /// Returns `true` if the membership changed (and a new snapshot was published),
    /// `false` if it was already there or is retired
    pub fn inactive(&self, node: &Arc<ClusterNode>) -> bool {
        self.transition(node, || false)
    }

    /// Remove a node from both sets
    pub fn remove(&self, node: &ClusterNode) {
        let mut sets = self.sets.write();
        sets.active.remove(node.address());
        sets.inactive.remove(node.address());
        self.snapshot.store(Arc::new(sets.to_snapshot()));
    }

    fn transition<F>(&self, node: &Arc<ClusterNode>, to_active: F) -> bool
    where
        F: Fn() -> bool,
    {
        {
            let sets = self.sets.read();
            let to_active = to_active();
            let target = if to_active { &sets.active } else { &sets.inactive };
            if Partition::contains(target, node) {
                return false;
            }
        }

        let mut guard = self.sets.write();
        if node.is_retired() {
            log::debug!(
                "Service '{}': ignoring retired record of {}",
                self.name,
                node.address()
            );
            return false;
        }
        let to_active = to_active();
        let sets = &mut *guard;
        // another writer may have won the race between the two locks
        let (target, other) = if to_active {
            (&mut sets.active, &mut sets.inactive)
        } else {
            (&mut sets.inactive, &mut sets.active)
        };
        if Partition::contains(target, node) {
            return false;
        }
        other.remove(node.address());
        target.insert(node.address().to_string(), node.clone());
        self.snapshot.store(Arc::new(sets.to_snapshot()));
        log::debug!(
            "Service '{}': {} is now {}",
            self.name,
            node.address(),
            if to_active { "active" } else { "inactive" }
        );
        true
    }
}
