// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::routing::head;
use axum::Router;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

use crate::protocol::{ClusterStatus, RegisterRequest, ServiceStatus, ServiceSummary};
use crate::{ClientErr, ClusterService, NodeState, NodeStatus, HEADER_CHECK_NAME};

pub async fn periodic_check<F>(check: F, timeout: Duration)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(check(), "Periodic check failed after {timeout:?}");
}

/// How a fake node answers health checks
#[derive(Clone, Copy, Debug)]
pub enum CheckBehavior {
    /// Answer 200 and echo the token
    Healthy,
    /// Answer 200 with a different token
    WrongToken,
    /// Answer 200 without the token header
    NoToken,
    /// Answer 503, echoing the token
    Failing,
    /// Never answer
    Hang,
}

/// Spawn a fake node serving the check endpoint on an ephemeral local port
pub async fn spawn_check_server(behavior: CheckBehavior) -> SocketAddr {
    let app = Router::new().route(
        crate::CLUSTER_PATH,
        head(move |headers: HeaderMap| async move {
            let mut reply = HeaderMap::new();
            let token = headers.get(HEADER_CHECK_NAME).cloned();
            match behavior {
                CheckBehavior::Healthy => {
                    if let Some(token) = token {
                        reply.insert(HEADER_CHECK_NAME, token);
                    }
                    (StatusCode::OK, reply)
                }
                CheckBehavior::WrongToken => {
                    reply.insert(HEADER_CHECK_NAME, HeaderValue::from_static("not-your-token"));
                    (StatusCode::OK, reply)
                }
                CheckBehavior::NoToken => (StatusCode::OK, reply),
                CheckBehavior::Failing => {
                    if let Some(token) = token {
                        reply.insert(HEADER_CHECK_NAME, token);
                    }
                    (StatusCode::SERVICE_UNAVAILABLE, reply)
                }
                CheckBehavior::Hang => {
                    sleep(Duration::from_secs(3600)).await;
                    (StatusCode::OK, reply)
                }
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind check server");
    let addr = listener.local_addr().expect("Check server has no address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address on which nothing listens
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Listener has no address");
    drop(listener);
    addr
}

/// An in-memory master which either answers everything or fails everything
pub struct FakeMaster {
    pub name: &'static str,
    pub up: bool,
    pub calls: Arc<AtomicUsize>,
    pub registered: Arc<Mutex<BTreeMap<String, BTreeSet<String>>>>,
}

impl FakeMaster {
    pub fn new(name: &'static str, up: bool) -> Self {
        Self {
            name,
            up,
            calls: Arc::new(AtomicUsize::new(0)),
            registered: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    fn enter(&self) -> Result<(), ClientErr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.up {
            Ok(())
        } else {
            Err(ClientErr::UnexpectedStatus(503))
        }
    }
}

#[async_trait::async_trait]
impl ClusterService for FakeMaster {
    async fn list(&self) -> Result<ClusterStatus, ClientErr> {
        self.enter()?;
        Ok(ClusterStatus {
            is_master: true,
            masters: vec![self.name.to_string()],
            ..Default::default()
        })
    }

    async fn get_nodes(&self) -> Result<BTreeMap<String, BTreeSet<String>>, ClientErr> {
        self.enter()?;
        Ok(self.registered.lock().clone())
    }

    async fn register(&self, request: &RegisterRequest) -> Result<NodeStatus, ClientErr> {
        self.enter()?;
        self.registered
            .lock()
            .insert(request.address.clone(), request.services.clone());
        Ok(NodeStatus::new(
            self.name.len() as u64,
            NodeState::Undetermined,
            None,
            None,
        ))
    }

    async fn unregister(&self, address: &str) -> Result<bool, ClientErr> {
        self.enter()?;
        Ok(self.registered.lock().remove(address).is_some())
    }

    async fn check(&self, _token: &str) -> Result<bool, ClientErr> {
        self.enter()?;
        Ok(true)
    }

    async fn get_services_status(&self) -> Result<BTreeMap<String, ServiceSummary>, ClientErr> {
        self.enter()?;
        Ok(BTreeMap::from([(
            "search".to_string(),
            ServiceSummary::new(1, 0),
        )]))
    }

    async fn get_service_status(&self, _service: &str) -> Result<ServiceStatus, ClientErr> {
        self.enter()?;
        Ok(ServiceStatus {
            active: vec![self.name.to_string()],
            ..Default::default()
        })
    }

    async fn get_active_nodes(&self, _service: &str) -> Result<Vec<String>, ClientErr> {
        self.enter()?;
        Ok(vec![self.name.to_string()])
    }

    async fn get_active_node_random(&self, _service: &str) -> Result<Option<String>, ClientErr> {
        self.enter()?;
        Ok(None)
    }
}
