// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Clients of the cluster HTTP API.
//!
//! [ClusterService] is the API of one master. [ClusterClient] speaks it over HTTP to a
//! single master, while [MultiClient] wraps one client per configured master and
//! presents the same API with failover for reads and broadcast for writes.

use std::collections::{BTreeMap, BTreeSet};

use crate::protocol::{ClusterStatus, RegisterRequest, ServiceStatus, ServiceSummary};
use crate::{ClientErr, NodeStatus};

mod multi;
mod single;

pub use multi::MultiClient;
pub use single::ClusterClient;

#[cfg(test)]
mod tests;

/// The operations a cluster master serves
#[async_trait::async_trait]
pub trait ClusterService: Send + Sync {
    /// Full snapshot of the master's registry
    async fn list(&self) -> Result<ClusterStatus, ClientErr>;

    /// Every registered node and the services it provides
    async fn get_nodes(&self) -> Result<BTreeMap<String, BTreeSet<String>>, ClientErr>;

    /// Register (or re-register) a node, returning its status
    async fn register(&self, request: &RegisterRequest) -> Result<NodeStatus, ClientErr>;

    /// Unregister a node. Returns `false` if the node wasn't registered
    async fn unregister(&self, address: &str) -> Result<bool, ClientErr>;

    /// Run the health-check handshake against the master itself. Returns `true`
    /// if the master echoed `token`
    async fn check(&self, token: &str) -> Result<bool, ClientErr>;

    /// Node counts and health of every known service
    async fn get_services_status(&self) -> Result<BTreeMap<String, ServiceSummary>, ClientErr>;

    /// Active and inactive nodes of one service
    async fn get_service_status(&self, service: &str) -> Result<ServiceStatus, ClientErr>;

    /// The active nodes of one service
    async fn get_active_nodes(&self, service: &str) -> Result<Vec<String>, ClientErr>;

    /// A random active node of one service, [None] if there's none
    async fn get_active_node_random(&self, service: &str) -> Result<Option<String>, ClientErr>;
}
