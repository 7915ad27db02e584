// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The cluster REST API, served with axum.
//!
//! | Method | Path | Answer |
//! |---|---|---|
//! | GET | `/cluster` | [ClusterStatus] |
//! | HEAD | `/cluster` | echoes the check token header |
//! | POST | `/cluster` | registers a node, answers its [NodeStatus] |
//! | DELETE | `/cluster?address=` | unregisters a node |
//! | GET | `/cluster/nodes` | address to services map |
//! | GET | `/cluster/services` | per service [oss_cluster::ServiceSummary] |
//! | GET | `/cluster/services/{name}` | [ServiceStatus] |
//! | GET | `/cluster/services/active/{name}` | active addresses, one per line |
//! | GET | `/cluster/services/active/random/{name}` | one random active address |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use oss_cluster::{
    ClusterErr, ClusterManager, ClusterStatus, NodeStatus, RegisterRequest, ServiceStatus,
    ServiceSummary, CLUSTER_PATH, HEADER_CHECK_NAME,
};


/// State shared by every handler.
///
/// The manager slot is filled once the process finished its cluster setup. Until
/// then, registry endpoints answer [ClusterErr::NotInitialized].
#[derive(Clone, Default)]
pub struct AppState {
    manager: Arc<OnceCell<Arc<ClusterManager>>>,
}

impl AppState {
    /// A state without manager yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the manager. Returns `false` if one was already installed
    pub fn initialize(&self, manager: Arc<ClusterManager>) -> bool {
        self.manager.set(manager).is_ok()
    }

    fn manager(&self) -> Result<&Arc<ClusterManager>, ApiError> {
        self.manager
            .get()
            .ok_or(ApiError(ClusterErr::NotInitialized))
    }
}

/// A [ClusterErr] answered over HTTP
#[derive(Debug)]
pub struct ApiError(pub ClusterErr);

impl ApiError {
    /// The status code answered for the error
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ClusterErr::NotMaster => StatusCode::NOT_ACCEPTABLE,
            ClusterErr::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            ClusterErr::MalformedAddress(_) => StatusCode::BAD_REQUEST,
            ClusterErr::NodeNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl From<ClusterErr> for ApiError {
    fn from(value: ClusterErr) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.0.to_string()).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the cluster API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            CLUSTER_PATH,
            get(list).head(check).post(register).delete(unregister),
        )
        .route(&format!("{CLUSTER_PATH}/nodes"), get(nodes))
        .route(&format!("{CLUSTER_PATH}/services"), get(services))
        .route(&format!("{CLUSTER_PATH}/services/{{name}}"), get(service_status))
        .route(
            &format!("{CLUSTER_PATH}/services/active/{{name}}"),
            get(active_nodes),
        )
        .route(
            &format!("{CLUSTER_PATH}/services/active/random/{{name}}"),
            get(random_active_node),
        )
        .with_state(state)
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<ClusterStatus>> {
    Ok(Json(state.manager()?.cluster_status()?))
}

async fn check(headers: HeaderMap) -> impl IntoResponse {
    let mut reply = HeaderMap::new();
    if let Some(token) = headers.get(HEADER_CHECK_NAME) {
        reply.insert(HEADER_CHECK_NAME, token.clone());
    }
    (StatusCode::OK, reply)
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<NodeStatus>> {
    let node = state
        .manager()?
        .upsert_node(&request.address, request.services)?;
    Ok(Json(node.status().as_ref().clone()))
}

#[derive(Deserialize)]
struct UnregisterQuery {
    address: Option<String>,
}

async fn unregister(
    State(state): State<AppState>,
    Query(query): Query<UnregisterQuery>,
) -> ApiResult<StatusCode> {
    let manager = state.manager()?;
    let Some(address) = query.address.filter(|a| !a.trim().is_empty()) else {
        return Err(ClusterErr::MalformedAddress(String::new()).into());
    };
    manager.remove_node(&address)?;
    Ok(StatusCode::OK)
}

async fn nodes(State(state): State<AppState>) -> ApiResult<Json<BTreeMap<String, BTreeSet<String>>>> {
    Ok(Json(state.manager()?.nodes_map()?))
}

async fn services(
    State(state): State<AppState>,
) -> ApiResult<Json<BTreeMap<String, ServiceSummary>>> {
    Ok(Json(state.manager()?.services_status()?))
}

async fn service_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ServiceStatus>> {
    Ok(Json(state.manager()?.service_status(&name)?))
}

async fn active_nodes(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let nodes = state.manager()?.active_nodes(&name)?;
    Ok(plain_text(nodes.join("\n")))
}

async fn random_active_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    match state.manager()?.random_active_node(&name)? {
        Some(address) => Ok(plain_text(address)),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

fn plain_text(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
