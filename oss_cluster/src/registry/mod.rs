// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The master-side registry of cluster nodes.
//!
//! The [ClusterRegistry] owns the address-to-node map and one [ServiceIndex] per known
//! service name. Structural mutations (registrations and removals) are serialized by a
//! single mutation lock and, once applied, published as fresh immutable snapshots. Every
//! read goes through those snapshots and never takes the lock.
//!
//! Health-check completions don't take the mutation lock either: they only touch their
//! own record and the indexes of its services. A record dropped by a mutation is retired
//! first, so a late completion for it can't put it back into any index.
//!
//! Every address is normalized with the registry's default port, the port the process
//! listens on, when it carries none.
//!
//! At any quiescent point the service indexes are exactly what replaying every node's
//! service set against the node map would produce: a node is indexed under a service
//! iff that service is in its service set, and sits in the active partition iff its
//! latest status is online. Indexes which become empty are dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::address::normalize;
use crate::protocol::{ClusterStatus, ServiceStatus, ServiceSummary};
use crate::{ClusterErr, ClusterNode, NodeStatus, ServiceIndex};

#[cfg(test)]
mod tests;

type ServiceMap = BTreeMap<String, Arc<ServiceIndex>>;

#[derive(Default)]
struct RegistryState {
    nodes: BTreeMap<String, Arc<ClusterNode>>,
    services: ServiceMap,
}

impl RegistryState {
    fn index(&mut self, node: &Arc<ClusterNode>) {
        for service in node.services() {
            self.services
                .entry(service.clone())
                .or_insert_with(|| Arc::new(ServiceIndex::new(service.clone())))
                .insert(node);
        }
    }

    fn unindex(&mut self, node: &ClusterNode) {
        for service in node.services() {
            if let Some(index) = self.services.get(service) {
                index.remove(node);
                if index.is_empty() {
                    self.services.remove(service);
                }
            }
        }
    }
}

/// The registry of every node known to a master
pub struct ClusterRegistry {
    masters: Vec<String>,
    default_port: u16,
    state: Mutex<RegistryState>,
    node_list: ArcSwap<Vec<Arc<ClusterNode>>>,
    services: ArcSwap<ServiceMap>,
}

impl std::fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRegistry")
            .field("masters", &self.masters)
            .field("default_port", &self.default_port)
            .field("nodes", &self.node_list.load().len())
            .field("services", &self.services.load().len())
            .finish()
    }
}

impl ClusterRegistry {
    /// Create a new, empty, registry
    ///
    /// * `masters` - The normalized addresses of the configured masters
    /// * `default_port` - The port given to addresses which carry none
    pub fn new(masters: Vec<String>, default_port: u16) -> Self {
        Self {
            masters,
            default_port,
            state: Mutex::new(RegistryState::default()),
            node_list: ArcSwap::from_pointee(Vec::new()),
            services: ArcSwap::from_pointee(ServiceMap::new()),
        }
    }

    /// The configured masters
    pub fn masters(&self) -> &[String] {
        &self.masters
    }

    /// The port given to addresses which carry none
    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Create or replace the record of a node.
    ///
    /// Registering an address again with the very same services keeps the existing
    /// record, and its health status, untouched. Any other service set replaces the
    /// record with a new `undetermined` one indexed only under the new services.
    ///
    /// * `address` - The node's address, normalized with [Self::default_port] when it
    /// has none
    /// * `services` - The services provided by the node
    ///
    /// Returns the node's current record, or [ClusterErr::MalformedAddress]
    pub fn upsert(
        &self,
        address: &str,
        services: BTreeSet<String>,
    ) -> Result<Arc<ClusterNode>, ClusterErr> {
        let address = normalize(address, Some(self.default_port))?;

        let mut state = self.state.lock();
        if let Some(existing) = state.nodes.get(&address) {
            if existing.services() == &services {
                log::debug!("Cluster node {} registered again", address);
                return Ok(existing.clone());
            }
        }
        if let Some(previous) = state.nodes.remove(&address) {
            previous.retire();
            state.unindex(&previous);
        }
        let node = Arc::new(ClusterNode::new(address.clone(), services));
        state.index(&node);
        state.nodes.insert(address, node.clone());
        self.publish(&state);

        log::info!(
            "Cluster node {} registered with services {:?}",
            node.address(),
            node.services()
        );
        Ok(node)
    }

    /// Remove a node from the registry and from every service it was indexed under.
    ///
    /// Returns the removed record, [None] if no node is registered at `address`, or
    /// [ClusterErr::MalformedAddress]
    pub fn remove(&self, address: &str) -> Result<Option<Arc<ClusterNode>>, ClusterErr> {
        let address = normalize(address, Some(self.default_port))?;

        let mut state = self.state.lock();
        let removed = state.nodes.remove(&address);
        if let Some(node) = &removed {
            node.retire();
            state.unindex(node);
            self.publish(&state);
            log::info!("Cluster node {} unregistered", address);
        }
        Ok(removed)
    }

    /// Record the outcome of a health check and repartition the node in each of
    /// its services.
    ///
    /// Completions for a record which has since been replaced or removed are dropped,
    /// returning `false`. Never takes the mutation lock
    pub fn update_status(&self, node: &Arc<ClusterNode>, status: NodeStatus) -> bool {
        if node.is_retired() {
            log::debug!("Dropping stale check result for {}", node.address());
            return false;
        }

        let previous = node.status().state;
        if previous != status.state {
            log::info!(
                "Cluster node {} is now {} (was {})",
                node.address(),
                status.state,
                previous
            );
        }
        node.set_status(status);
        let services = self.services.load();
        for service in node.services() {
            if let Some(index) = services.get(service) {
                index.insert(node);
            }
        }
        true
    }

    fn publish(&self, state: &RegistryState) {
        self.node_list
            .store(Arc::new(state.nodes.values().cloned().collect()));
        self.services.store(Arc::new(state.services.clone()));
    }

    // ============== Lock-free reads ============== //

    /// Every registered node, sorted by address
    pub fn list_nodes(&self) -> Arc<Vec<Arc<ClusterNode>>> {
        self.node_list.load_full()
    }

    /// The index of a service, if any node provides it
    pub fn service(&self, name: &str) -> Option<Arc<ServiceIndex>> {
        self.services.load().get(name).cloned()
    }

    /// The addresses of the active nodes providing `service`. Empty for an unknown
    /// service
    pub fn active_nodes(&self, service: &str) -> Vec<String> {
        self.service(service)
            .map(|index| index.snapshot().active_addresses())
            .unwrap_or_default()
    }

    /// The addresses of the inactive nodes providing `service`. Empty for an unknown
    /// service
    pub fn inactive_nodes(&self, service: &str) -> Vec<String> {
        self.service(service)
            .map(|index| index.snapshot().inactive_addresses())
            .unwrap_or_default()
    }

    /// A uniformly random active node providing `service`
    pub fn random_active_node(&self, service: &str) -> Option<String> {
        self.service(service)?
            .random_active()
            .map(|node| node.address().to_string())
    }

    /// The active nodes of `service`, and the inactive ones with their status
    pub fn service_status(&self, service: &str) -> ServiceStatus {
        let Some(index) = self.service(service) else {
            return ServiceStatus::default();
        };
        let snapshot = index.snapshot();
        ServiceStatus {
            active: snapshot.active_addresses(),
            inactive: snapshot
                .inactive
                .iter()
                .map(|node| (node.address().to_string(), node.status().as_ref().clone()))
                .collect(),
        }
    }

    /// Node counts and health of every known service
    pub fn services_summary(&self) -> BTreeMap<String, ServiceSummary> {
        self.services
            .load()
            .iter()
            .map(|(name, index)| {
                let snapshot = index.snapshot();
                (
                    name.clone(),
                    ServiceSummary::new(snapshot.active.len(), snapshot.inactive.len()),
                )
            })
            .collect()
    }

    /// Every registered node and the services it provides
    pub fn nodes_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.node_list
            .load()
            .iter()
            .map(|node| (node.address().to_string(), node.services().clone()))
            .collect()
    }

    /// Full snapshot of the registry
    pub fn cluster_status(&self) -> ClusterStatus {
        let nodes = self
            .node_list
            .load()
            .iter()
            .map(|node| (node.address().to_string(), node.status().as_ref().clone()))
            .collect();
        let services = self
            .services
            .load()
            .iter()
            .map(|(name, index)| {
                let snapshot = index.snapshot();
                let addresses = snapshot
                    .active
                    .iter()
                    .chain(snapshot.inactive.iter())
                    .map(|node| node.address().to_string())
                    .collect();
                (name.clone(), addresses)
            })
            .collect();
        ClusterStatus {
            is_master: true,
            nodes,
            services,
            masters: self.masters.clone(),
        }
    }
}
