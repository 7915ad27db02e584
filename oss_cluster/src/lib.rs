// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! `oss_cluster`: a self-hosted cluster membership and service-discovery registry.
//!
//! Nodes register themselves, and the services they provide, with a small set of
//! statically configured **master** processes. Every master keeps a
//! [ClusterRegistry] of the nodes it knows about, continuously health-checks
//! them with a [HealthMonitor] and answers "which nodes currently provide service X"
//! with load-balanced (uniform random) selection.
//!
//! There is no consensus store and no gossip protocol. Master-ness is fixed at startup
//! by comparing the process' own normalized address against the configured master set
//! and liveness is determined purely by periodic direct checks.
//!
//! ## Overview
//!
//! 1. [ClusterNode] describes one registered peer: its normalized address, its service
//!    set and its latest [NodeStatus].
//! 2. [ServiceIndex] partitions the nodes providing one service into an active and an
//!    inactive set and publishes an immutable [ServiceSnapshot] after every change.
//! 3. [ClusterRegistry] is the master-side authority owning the node map and one
//!    [ServiceIndex] per known service name. Reads never take a lock.
//! 4. [HealthMonitor] is an actor which sweeps the registry on a fixed period, probing
//!    every node with a token-based `HEAD` request.
//! 5. [MultiClient] is the caller-facing client which fails over across masters for
//!    reads and broadcasts writes to every master.
//!
//! [ClusterManager] ties the pieces together for a single process, making "this process
//! is not a master" an explicit error ([ClusterErr::NotMaster]) instead of a null check.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use oss_cluster::{ClusterConfig, ClusterManager};
//!
//! let config = ClusterConfig {
//!     masters: vec!["http://10.0.0.1:9099".to_string()],
//! };
//! let manager = ClusterManager::new(&config, "10.0.0.1", 9099).expect("Invalid configuration");
//! assert!(manager.is_master());
//!
//! let services = BTreeSet::from(["search".to_string()]);
//! manager.upsert_node("10.0.0.2:9090", services).expect("Registration failed");
//!
//! // freshly registered nodes are not yet online
//! assert!(manager.active_nodes("search").unwrap().is_empty());
//! assert_eq!(
//!     vec!["http://10.0.0.2:9090".to_string()],
//!     manager.inactive_nodes("search").unwrap()
//! );
//! ```

#![warn(unused_imports)]
#![warn(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod address;
pub mod client;
pub mod config;
pub mod errors;
pub mod manager;
pub mod monitor;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod service_index;

#[cfg(test)]
pub(crate) mod common_test;

/// The path, relative to a node's base address, which serves the cluster API
/// and the health-check endpoint
pub const CLUSTER_PATH: &str = "/cluster";

/// The header carrying the health-check token. A healthy node echoes the token
/// it received in the same header of its response
pub const HEADER_CHECK_NAME: &str = "X-OSS-CLUSTER-CHECK-TOKEN";

// ============== Re-exports ============== //
pub use client::{ClusterClient, ClusterService, MultiClient};
pub use config::{ClusterConfig, MonitorConfig};
pub use errors::{ClientErr, ClusterErr, ConfigErr};
pub use manager::ClusterManager;
pub use monitor::{HealthMonitor, MonitorMessage};
pub use node::{ClusterNode, NodeState, NodeStatus};
pub use protocol::{ClusterStatus, RegisterRequest, ServiceHealth, ServiceStatus, ServiceSummary};
pub use registry::ClusterRegistry;
pub use service_index::{ServiceIndex, ServiceSnapshot};
