// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Failover across every configured master.
//!
//! Reads try the masters one after the other, in configured order, and return the
//! first success. Writes are broadcast to every master concurrently so that each
//! master's registry converges. A write succeeds as soon as one master accepted it,
//! and the answer of the first accepting master (in configured order) is returned.
//! Failures of individual masters are logged, and only surface when every master
//! failed, as [ClientErr::AllMastersFailed] wrapping the last error.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use futures::future::{join_all, BoxFuture};

use super::{ClusterClient, ClusterService};
use crate::protocol::{ClusterStatus, RegisterRequest, ServiceStatus, ServiceSummary};
use crate::{ClientErr, NodeStatus};

/// A [ClusterService] failing over across several masters
pub struct MultiClient<C = ClusterClient> {
    clients: Vec<(String, C)>,
}

impl MultiClient<ClusterClient> {
    /// Build one [ClusterClient] per master
    ///
    /// * `masters` - The master addresses, in the order reads try them
    /// * `timeout` - Bound on every request to each master
    pub fn new(masters: &[String], timeout: Duration) -> Result<Self, ClientErr> {
        let clients = masters
            .iter()
            .map(|master| Ok((master.clone(), ClusterClient::new(master, timeout)?)))
            .collect::<Result<Vec<_>, ClientErr>>()?;
        Ok(Self { clients })
    }
}

impl<C> MultiClient<C>
where
    C: ClusterService,
{
    /// Wrap pre-built clients, keyed by master address
    pub fn from_clients(clients: Vec<(String, C)>) -> Self {
        Self { clients }
    }

    /// The wrapped masters, in order
    pub fn masters(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(|(master, _)| master.as_str())
    }

    async fn first_success<'a, T, F>(&'a self, operation: &str, call: F) -> Result<T, ClientErr>
    where
        F: Fn(&'a C) -> BoxFuture<'a, Result<T, ClientErr>> + Send,
        T: Send,
    {
        let mut last = ClientErr::NoMasters;
        for (master, client) in self.clients.iter() {
            match call(client).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    log::warn!("Cluster {} failed on master {}: {}", operation, master, err);
                    last = err;
                }
            }
        }
        Err(failed(last))
    }

    async fn broadcast<'a, T, F>(
        &'a self,
        operation: &str,
        call: F,
    ) -> Vec<Result<T, ClientErr>>
    where
        F: Fn(&'a C) -> BoxFuture<'a, Result<T, ClientErr>> + Send,
        T: Send,
    {
        let results = join_all(self.clients.iter().map(|(_, client)| call(client))).await;
        for ((master, _), result) in self.clients.iter().zip(results.iter()) {
            if let Err(err) = result {
                log::warn!("Cluster {} failed on master {}: {}", operation, master, err);
            }
        }
        results
    }
}

fn failed(last: ClientErr) -> ClientErr {
    match last {
        ClientErr::NoMasters => ClientErr::NoMasters,
        other => ClientErr::AllMastersFailed(Box::new(other)),
    }
}

#[async_trait::async_trait]
impl<C> ClusterService for MultiClient<C>
where
    C: ClusterService,
{
    async fn list(&self) -> Result<ClusterStatus, ClientErr> {
        self.first_success("list", |client| client.list()).await
    }

    async fn get_nodes(&self) -> Result<BTreeMap<String, BTreeSet<String>>, ClientErr> {
        self.first_success("get_nodes", |client| client.get_nodes())
            .await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<NodeStatus, ClientErr> {
        let mut last = ClientErr::NoMasters;
        let mut accepted = None;
        for result in self
            .broadcast("register", |client| client.register(request))
            .await
        {
            match result {
                Ok(status) if accepted.is_none() => accepted = Some(status),
                Ok(_) => {}
                Err(err) => last = err,
            }
        }
        accepted.ok_or_else(|| failed(last))
    }

    async fn unregister(&self, address: &str) -> Result<bool, ClientErr> {
        let mut last = ClientErr::NoMasters;
        let mut removed = None;
        for result in self
            .broadcast("unregister", |client| client.unregister(address))
            .await
        {
            match result {
                Ok(found) => removed = Some(removed.unwrap_or(false) || found),
                Err(err) => last = err,
            }
        }
        removed.ok_or_else(|| failed(last))
    }

    async fn check(&self, _token: &str) -> Result<bool, ClientErr> {
        Err(ClientErr::NotImplemented)
    }

    async fn get_services_status(&self) -> Result<BTreeMap<String, ServiceSummary>, ClientErr> {
        self.first_success("get_services_status", |client| {
            client.get_services_status()
        })
        .await
    }

    async fn get_service_status(&self, service: &str) -> Result<ServiceStatus, ClientErr> {
        self.first_success("get_service_status", |client| {
            client.get_service_status(service)
        })
        .await
    }

    async fn get_active_nodes(&self, service: &str) -> Result<Vec<String>, ClientErr> {
        self.first_success("get_active_nodes", |client| {
            client.get_active_nodes(service)
        })
        .await
    }

    async fn get_active_node_random(&self, service: &str) -> Result<Option<String>, ClientErr> {
        self.first_success("get_active_node_random", |client| {
            client.get_active_node_random(service)
        })
        .await
    }
}
