// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Wire types exchanged between masters, nodes and clients. All of them are
//! JSON encoded over HTTP

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::NodeStatus;

/// Body of a registration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// The address of the registering node
    pub address: String,
    /// The services the node provides
    #[serde(default)]
    pub services: BTreeSet<String>,
}

impl RegisterRequest {
    /// Build a registration request
    pub fn new<I, S>(address: impl Into<String>, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            address: address.into(),
            services: services.into_iter().map(Into::into).collect(),
        }
    }
}

/// Full snapshot of a master's registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Whether the answering process is a master
    pub is_master: bool,
    /// Every registered node and its latest status
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeStatus>,
    /// Every known service and the nodes providing it
    #[serde(default)]
    pub services: BTreeMap<String, BTreeSet<String>>,
    /// The configured masters
    #[serde(default)]
    pub masters: Vec<String>,
}

/// Membership of a single service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// The active nodes
    #[serde(default)]
    pub active: Vec<String>,
    /// The inactive nodes, with the status explaining why
    #[serde(default)]
    pub inactive: BTreeMap<String, NodeStatus>,
}

/// Overall health of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealth {
    /// Every node providing the service is active
    Ok,
    /// Some nodes are active, some aren't
    Degraded,
    /// No node providing the service is active
    Failure,
}

impl ServiceHealth {
    /// Derive the health from the node counts
    pub fn from_counts(active: usize, inactive: usize) -> Self {
        match (active, inactive) {
            (0, _) => Self::Failure,
            (_, 0) => Self::Ok,
            _ => Self::Degraded,
        }
    }
}

/// Node counts of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    /// Number of active nodes
    pub active: usize,
    /// Number of inactive nodes
    pub inactive: usize,
    /// The derived health
    pub status: ServiceHealth,
}

impl ServiceSummary {
    /// Build a summary from the node counts
    pub fn new(active: usize, inactive: usize) -> Self {
        Self {
            active,
            inactive,
            status: ServiceHealth::from_counts(active, inactive),
        }
    }
}
