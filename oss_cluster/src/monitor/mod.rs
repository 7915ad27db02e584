// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The health monitor: an actor periodically probing every registered node.
//!
//! After [MonitorConfig::initial_delay] the actor sweeps the registry every
//! [MonitorConfig::interval]. A sweep spawns one probe task per node and returns
//! immediately, so a slow node never delays the next sweep. Each probe funnels its
//! outcome into [ClusterRegistry::update_status] on completion.
//!
//! A node whose previous probe is still running is skipped by the sweep, so no two
//! probes of the same node are ever in flight. When the actor stops, every pending
//! probe is cancelled and leaves its node's status untouched.

use std::sync::Arc;

use dashmap::DashSet;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::node::check::HealthCheck;
use crate::{ClusterRegistry, MonitorConfig};


/// Messages handled by the [HealthMonitor]
pub enum MonitorMessage {
    /// Probe every registered node now
    Sweep,
    /// Start the periodic sweeps
    StartInterval,
    /// Reply with the number of probes currently in flight
    InFlight(RpcReplyPort<usize>),
}

/// The [HealthMonitor]'s state
pub struct MonitorState {
    registry: Arc<ClusterRegistry>,
    config: MonitorConfig,
    check: HealthCheck,
    in_flight: Arc<DashSet<String>>,
    cancel: watch::Sender<bool>,
    interval: Option<JoinHandle<()>>,
}

/// The health monitor actor. Spawn it with [Actor::spawn] and the registry to watch
pub struct HealthMonitor;

impl HealthMonitor {
    fn sweep(state: &MonitorState) {
        let nodes = state.registry.list_nodes();
        log::debug!("Health check sweep over {} nodes", nodes.len());

        for node in nodes.iter() {
            if !state.in_flight.insert(node.address().to_string()) {
                log::debug!(
                    "Previous check of {} still running, skipping",
                    node.address()
                );
                continue;
            }

            let node = node.clone();
            let registry = state.registry.clone();
            let check = state.check.clone();
            let in_flight = state.in_flight.clone();
            let mut cancel = state.cancel.subscribe();
            tokio::spawn(async move {
                if let Some(status) = check.probe(&node, &mut cancel).await {
                    registry.update_status(&node, status);
                }
                in_flight.remove(node.address());
            });
        }
    }
}

#[async_trait::async_trait]
impl Actor for HealthMonitor {
    type Msg = MonitorMessage;
    type State = MonitorState;
    type Arguments = (Arc<ClusterRegistry>, MonitorConfig);

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        (registry, config): (Arc<ClusterRegistry>, MonitorConfig),
    ) -> Result<Self::State, ActorProcessingErr> {
        let check = HealthCheck::new(config.probe_timeout())?;
        let (cancel, _) = watch::channel(false);

        log::info!(
            "Starting the health monitor: first sweep in {:?}, then every {:?}",
            config.initial_delay,
            config.interval
        );
        myself.send_after(config.initial_delay, || MonitorMessage::StartInterval);

        Ok(MonitorState {
            registry,
            config,
            check,
            in_flight: Arc::new(DashSet::new()),
            cancel,
            interval: None,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(interval) = state.interval.take() {
            interval.abort();
        }
        // wakes up every pending probe, which then gives up
        state.cancel.send_replace(true);
        log::info!("Health monitor stopped");
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            MonitorMessage::Sweep => Self::sweep(state),
            MonitorMessage::StartInterval => {
                Self::sweep(state);
                if state.interval.is_none() {
                    state.interval = Some(
                        myself.send_interval(state.config.interval, || MonitorMessage::Sweep),
                    );
                }
            }
            MonitorMessage::InFlight(reply) => {
                if !reply.is_closed() {
                    let _ = reply.send(state.in_flight.len());
                }
            }
        }
        Ok(())
    }
}
