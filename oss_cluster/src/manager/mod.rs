// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The process-level view of the cluster.
//!
//! A [ClusterManager] is built once at startup from the [ClusterConfig] and the
//! process' own advertised hostname and port. It decides, once and for all, whether
//! the process is a master: only then does it own a [ClusterRegistry], and every
//! registry operation on a non-master fails with [ClusterErr::NotMaster].
//!
//! It also drives the process' life in the cluster: pulling the node list from the
//! other masters at startup ([ClusterManager::bootstrap]), spawning the
//! [HealthMonitor] and (un)registering the process' own services with every master.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorRef, SpawnErr};
use tokio::task::JoinHandle;

use crate::address::normalize;
use crate::protocol::{ClusterStatus, RegisterRequest, ServiceStatus, ServiceSummary};
use crate::{
    ClientErr, ClusterClient, ClusterConfig, ClusterErr, ClusterNode, ClusterRegistry,
    ClusterService, HealthMonitor, MonitorConfig, MonitorMessage, MultiClient, NodeStatus,
};


/// The process' membership in the cluster
#[derive(Debug)]
pub struct ClusterManager {
    my_address: String,
    masters: Vec<String>,
    registry: Option<Arc<ClusterRegistry>>,
}

impl ClusterManager {
    /// Build the manager of this process
    ///
    /// * `config` - The cluster configuration
    /// * `hostname` - The hostname this process is reachable at by the other processes
    /// * `port` - The port this process listens on, given to the hostname, the masters
    /// and every registered node address which carry none
    ///
    /// Returns [ClusterErr::MalformedAddress] if the hostname or a configured master
    /// can't be normalized
    pub fn new(config: &ClusterConfig, hostname: &str, port: u16) -> Result<Self, ClusterErr> {
        let my_address = normalize(hostname, Some(port))?;
        log::info!("Server: {}", my_address);

        let mut masters: Vec<String> = Vec::with_capacity(config.masters.len());
        for master in config.masters.iter() {
            let address = normalize(master, Some(port))?;
            if !masters.contains(&address) {
                log::info!("Add a master: {}", address);
                masters.push(address);
            }
        }
        if masters.is_empty() {
            log::info!("No cluster configuration. This node is not part of a cluster.");
        }

        let registry = if masters.contains(&my_address) {
            log::info!("I am a master!");
            Some(Arc::new(ClusterRegistry::new(masters.clone(), port)))
        } else {
            None
        };

        Ok(Self {
            my_address,
            masters,
            registry,
        })
    }

    /// This process' normalized address
    pub fn my_address(&self) -> &str {
        &self.my_address
    }

    /// The normalized master addresses, in configured order
    pub fn masters(&self) -> &[String] {
        &self.masters
    }

    /// Whether this process is one of the masters
    pub fn is_master(&self) -> bool {
        self.registry.is_some()
    }

    /// Whether any master is configured at all
    pub fn is_clustered(&self) -> bool {
        !self.masters.is_empty()
    }

    /// The registry, only owned by masters
    pub fn registry(&self) -> Result<&Arc<ClusterRegistry>, ClusterErr> {
        self.registry.as_ref().ok_or(ClusterErr::NotMaster)
    }

    // ============== Registry operations ============== //

    /// See [ClusterRegistry::upsert]
    pub fn upsert_node(
        &self,
        address: &str,
        services: BTreeSet<String>,
    ) -> Result<Arc<ClusterNode>, ClusterErr> {
        self.registry()?.upsert(address, services)
    }

    /// Remove a node, failing with [ClusterErr::NodeNotFound] if it isn't registered
    pub fn remove_node(&self, address: &str) -> Result<Arc<ClusterNode>, ClusterErr> {
        self.registry()?
            .remove(address)?
            .ok_or_else(|| ClusterErr::NodeNotFound(address.to_string()))
    }

    /// See [ClusterRegistry::list_nodes]
    pub fn node_list(&self) -> Result<Arc<Vec<Arc<ClusterNode>>>, ClusterErr> {
        Ok(self.registry()?.list_nodes())
    }

    /// See [ClusterRegistry::active_nodes]
    pub fn active_nodes(&self, service: &str) -> Result<Vec<String>, ClusterErr> {
        Ok(self.registry()?.active_nodes(service))
    }

    /// See [ClusterRegistry::inactive_nodes]
    pub fn inactive_nodes(&self, service: &str) -> Result<Vec<String>, ClusterErr> {
        Ok(self.registry()?.inactive_nodes(service))
    }

    /// See [ClusterRegistry::random_active_node]
    pub fn random_active_node(&self, service: &str) -> Result<Option<String>, ClusterErr> {
        Ok(self.registry()?.random_active_node(service))
    }

    /// See [ClusterRegistry::service_status]
    pub fn service_status(&self, service: &str) -> Result<ServiceStatus, ClusterErr> {
        Ok(self.registry()?.service_status(service))
    }

    /// See [ClusterRegistry::services_summary]
    pub fn services_status(&self) -> Result<BTreeMap<String, ServiceSummary>, ClusterErr> {
        Ok(self.registry()?.services_summary())
    }

    /// See [ClusterRegistry::nodes_map]
    pub fn nodes_map(&self) -> Result<BTreeMap<String, BTreeSet<String>>, ClusterErr> {
        Ok(self.registry()?.nodes_map())
    }

    /// See [ClusterRegistry::cluster_status]
    pub fn cluster_status(&self) -> Result<ClusterStatus, ClusterErr> {
        Ok(self.registry()?.cluster_status())
    }

    // ============== Lifecycle ============== //

    /// Pull the node list of the first other master which answers, over HTTP
    ///
    /// Returns the number of nodes imported
    pub async fn bootstrap(&self, timeout: Duration) -> usize {
        self.bootstrap_with(|master| ClusterClient::new(master, timeout))
            .await
    }

    /// Pull the node list of the first other master which answers and register
    /// every node it knows. Does nothing on a non-master.
    ///
    /// * `connect` - Builds the client of a master from its address
    ///
    /// Returns the number of nodes imported
    pub async fn bootstrap_with<C, F>(&self, connect: F) -> usize
    where
        C: ClusterService,
        F: Fn(&str) -> Result<C, ClientErr>,
    {
        let Some(registry) = &self.registry else {
            return 0;
        };
        for master in self.masters.iter().filter(|m| **m != self.my_address) {
            log::info!("Get node list from {}", master);
            let nodes = match connect(master) {
                Ok(client) => client.get_nodes().await,
                Err(err) => Err(err),
            };
            match nodes {
                Ok(nodes) => {
                    let mut imported = 0;
                    for (address, services) in nodes {
                        match registry.upsert(&address, services) {
                            Ok(_) => imported += 1,
                            Err(err) => log::warn!("Skipping node from {}: {}", master, err),
                        }
                    }
                    log::info!("Imported {} nodes from {}", imported, master);
                    return imported;
                }
                Err(err) => log::warn!("Unable to load the node list from {}: {}", master, err),
            }
        }
        0
    }

    /// Spawn the [HealthMonitor] over the registry. Does nothing on a non-master
    pub async fn spawn_monitor(
        &self,
        config: MonitorConfig,
    ) -> Result<Option<(ActorRef<MonitorMessage>, JoinHandle<()>)>, SpawnErr> {
        let Some(registry) = &self.registry else {
            return Ok(None);
        };
        let spawned = Actor::spawn(None, HealthMonitor, (registry.clone(), config)).await?;
        Ok(Some(spawned))
    }

    /// A client failing over across every master
    pub fn master_client(&self, timeout: Duration) -> Result<MultiClient, ClientErr> {
        MultiClient::new(&self.masters, timeout)
    }

    /// Register this process and its services with every master.
    ///
    /// Does nothing if no master is configured or there's no service to register.
    /// Returns the status answered by a master, [None] if nothing was registered
    pub async fn register_me(
        &self,
        services: &BTreeSet<String>,
        client: &impl ClusterService,
    ) -> Option<NodeStatus> {
        if !self.is_clustered() || services.is_empty() {
            return None;
        }
        log::info!("Registering {:?} with the cluster masters", services);
        let request = RegisterRequest {
            address: self.my_address.clone(),
            services: services.clone(),
        };
        match client.register(&request).await {
            Ok(status) => Some(status),
            Err(err) => {
                log::warn!("Unable to register with the cluster: {}", err);
                None
            }
        }
    }

    /// Unregister this process from every master
    pub async fn unregister_me(&self, client: &impl ClusterService) {
        if !self.is_clustered() {
            return;
        }
        log::info!("Unregistering from the cluster masters");
        if let Err(err) = client.unregister(&self.my_address).await {
            log::warn!("Unable to unregister from the cluster: {}", err);
        }
    }
}
