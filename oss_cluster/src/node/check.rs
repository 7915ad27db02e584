// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The node health-check protocol.
//!
//! A probe sends a body-less `HEAD` request to the node's [crate::CLUSTER_PATH]
//! carrying a fresh random token in the [crate::HEADER_CHECK_NAME] header. A healthy
//! node answers `200` and echoes the very same token in the same header.
//!
//! Whatever happens to the request (an answer, a transport failure or a cancellation)
//! is first captured as a [ProbeOutcome] and then reduced to the node's next
//! [NodeStatus] by [classify], which is the only place outcomes are interpreted.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::{millis, now_millis, ClusterNode, NodeState, NodeStatus};
use crate::{ClientErr, HEADER_CHECK_NAME};

/// The raw result of a single probe, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The node answered the request
    Response {
        /// The HTTP status code of the answer
        status: u16,
        /// The value of the check header in the answer, if present
        echoed: Option<String>,
    },
    /// The request failed at the network level (refused, timed out, DNS...)
    Failed(String),
    /// The request was abandoned before completion, e.g. on shutdown
    Cancelled,
}

/// Generate a fresh opaque check token
pub fn new_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Reduce a probe outcome into the next status of the probed node.
///
/// * `outcome` - What happened to the request
/// * `token` - The token which was sent with the request
/// * `check_url` - The probed url, used in error messages
/// * `latency` - Milliseconds between sending the request and the outcome
/// * `observed_at` - Unix milliseconds at which the outcome was observed
///
/// Returns [None] for a cancelled probe: the node's last known state stays more
/// informative than a cancellation artifact
pub fn classify(
    outcome: ProbeOutcome,
    token: &str,
    check_url: &str,
    latency: u64,
    observed_at: u64,
) -> Option<NodeStatus> {
    let (state, error) = match outcome {
        ProbeOutcome::Cancelled => return None,
        ProbeOutcome::Failed(reason) => (
            NodeState::Unreachable,
            Some(format!("Cluster node failure - {check_url}: {reason}")),
        ),
        ProbeOutcome::Response { status, .. } if status != 200 => (
            NodeState::UnexpectedResponse,
            Some(format!("Unexpected response: {status} - {check_url}")),
        ),
        ProbeOutcome::Response { echoed: None, .. } => (
            NodeState::UnexpectedResponse,
            Some(format!("Missing check token - {check_url}")),
        ),
        ProbeOutcome::Response {
            echoed: Some(echoed),
            ..
        } if echoed != token => (
            NodeState::UnexpectedResponse,
            Some(format!("Check token mismatch - {check_url}")),
        ),
        ProbeOutcome::Response { .. } => (NodeState::Online, None),
    };
    Some(NodeStatus::new(observed_at, state, Some(latency), error))
}

/// Issues health-check probes. Cheap to clone, clones share the same
/// connection pool
#[derive(Clone, Debug)]
pub struct HealthCheck {
    client: reqwest::Client,
}

impl HealthCheck {
    /// Create a new health checker
    ///
    /// * `timeout` - Bound on the whole probe (connect + answer)
    pub fn new(timeout: Duration) -> Result<Self, ClientErr> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Probe a node once.
    ///
    /// * `node` - The node to probe
    /// * `cancel` - Flips to `true` (or closes) when pending probes must be abandoned
    ///
    /// Returns the node's next status, or [None] if the probe was cancelled
    pub async fn probe(
        &self,
        node: &ClusterNode,
        cancel: &mut watch::Receiver<bool>,
    ) -> Option<NodeStatus> {
        let token = new_token();
        let started = Instant::now();
        let request = self
            .client
            .head(node.check_url())
            .header(HEADER_CHECK_NAME, token.as_str())
            .send();

        let outcome = tokio::select! {
            response = request => match response {
                Ok(response) => ProbeOutcome::Response {
                    status: response.status().as_u16(),
                    echoed: response
                        .headers()
                        .get(HEADER_CHECK_NAME)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string),
                },
                Err(err) => ProbeOutcome::Failed(err.to_string()),
            },
            _ = cancel.wait_for(|cancelled| *cancelled) => ProbeOutcome::Cancelled,
        };
        let latency = millis(started.elapsed());

        let status = classify(outcome, &token, node.check_url(), latency, now_millis());
        match &status {
            None => log::warn!("Cluster node check cancelled {}", node.check_url()),
            Some(NodeStatus {
                error: Some(error), ..
            }) => log::warn!("{}", error),
            Some(_) => log::debug!("Cluster node {} is online ({}ms)", node.address(), latency),
        }
        status
    }
}
