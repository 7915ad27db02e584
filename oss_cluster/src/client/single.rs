// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! HTTP client of a single master

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use reqwest::{Response, StatusCode, Url};

use super::ClusterService;
use crate::address::normalize;
use crate::protocol::{ClusterStatus, RegisterRequest, ServiceStatus, ServiceSummary};
use crate::{ClientErr, NodeStatus, HEADER_CHECK_NAME};

/// Talks to one master over HTTP
#[derive(Debug, Clone)]
pub struct ClusterClient {
    base: Url,
    client: reqwest::Client,
}

impl ClusterClient {
    /// Create a client of the master at `address`
    ///
    /// * `address` - The master's address. [crate::ClusterManager::master_client] hands
    /// out addresses already carrying the cluster port; a bare hostname given here is
    /// reached on the scheme's well-known port
    /// * `timeout` - Bound on every request
    pub fn new(address: &str, timeout: Duration) -> Result<Self, ClientErr> {
        let invalid = || ClientErr::InvalidUrl(address.to_string());
        let normalized = normalize(address, None).map_err(|_| invalid())?;
        let base = Url::parse(&normalized).map_err(|_| invalid())?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base, client })
    }

    /// The master's base url
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build the url of an endpoint below [crate::CLUSTER_PATH]. Segments are
    /// percent-encoded
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, ClientErr> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientErr::InvalidUrl(self.base.to_string()))?
            .clear()
            .push(crate::CLUSTER_PATH.trim_start_matches('/'))
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, segments: &[&str]) -> Result<Response, ClientErr> {
        let response = self.client.get(self.url(segments)?).send().await?;
        success(response)
    }
}

fn success(response: Response) -> Result<Response, ClientErr> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ClientErr::UnexpectedStatus(response.status().as_u16()))
    }
}

#[async_trait::async_trait]
impl ClusterService for ClusterClient {
    async fn list(&self) -> Result<ClusterStatus, ClientErr> {
        Ok(self.get(&[]).await?.json().await?)
    }

    async fn get_nodes(&self) -> Result<BTreeMap<String, BTreeSet<String>>, ClientErr> {
        Ok(self.get(&["nodes"]).await?.json().await?)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<NodeStatus, ClientErr> {
        let response = self
            .client
            .post(self.url(&[])?)
            .json(request)
            .send()
            .await?;
        Ok(success(response)?.json().await?)
    }

    async fn unregister(&self, address: &str) -> Result<bool, ClientErr> {
        let response = self
            .client
            .delete(self.url(&[])?)
            .query(&[("address", address)])
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => success(response).map(|_| true),
        }
    }

    async fn check(&self, token: &str) -> Result<bool, ClientErr> {
        let response = self
            .client
            .head(self.url(&[])?)
            .header(HEADER_CHECK_NAME, token)
            .send()
            .await?;
        let response = success(response)?;
        let echoed = response
            .headers()
            .get(HEADER_CHECK_NAME)
            .and_then(|value| value.to_str().ok());
        Ok(echoed == Some(token))
    }

    async fn get_services_status(&self) -> Result<BTreeMap<String, ServiceSummary>, ClientErr> {
        Ok(self.get(&["services"]).await?.json().await?)
    }

    async fn get_service_status(&self, service: &str) -> Result<ServiceStatus, ClientErr> {
        Ok(self.get(&["services", service]).await?.json().await?)
    }

    async fn get_active_nodes(&self, service: &str) -> Result<Vec<String>, ClientErr> {
        let body = self
            .get(&["services", "active", service])
            .await?
            .text()
            .await?;
        Ok(body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn get_active_node_random(&self, service: &str) -> Result<Option<String>, ClientErr> {
        let response = self
            .client
            .get(self.url(&["services", "active", "random", service])?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = success(response)?.text().await?;
        let address = body.trim();
        Ok((!address.is_empty()).then(|| address.to_string()))
    }
}
