/// HTTP surface for a driftkv node.
///
/// Two route families share one axum router:
///
/// - The client surface: `PUT/GET/DELETE /kv/:key`, coordinated across
///   replicas with per-request N/R/W overrides. A missed quorum maps to
///   503; invalid parameters map to 400.
/// - The internal node-to-node surface: `PUT /internal/kv/:key` appends a
///   single version at this replica (then compacts), and
///   `GET /internal/kv/:key` returns every stored version, tombstones
///   included.
///
/// Plus `GET /metrics` and `GET /status` for observability.
use crate::config::{validate_key, validate_quorum_params, ReplicaSettings};
use crate::coordinator::{apply_replica_write, Coordinator};
use crate::error::{DriftError, DriftResult};
use crate::failure::FailureDetector;
use crate::metrics::{Metrics, MetricsSummary};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// This node's coordinator.
    pub coordinator: Arc<Coordinator>,
    /// Advisory failure detector, surfaced on `/status`.
    pub failures: Arc<FailureDetector>,
    /// Metrics registry, surfaced on `/metrics`.
    pub metrics: Arc<Metrics>,
    /// Per-node replication defaults.
    pub settings: ReplicaSettings,
    /// Static ring membership, surfaced on `/status`.
    pub ring_nodes: Vec<String>,
}

/// Build the router over the node's state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/kv/:key",
            get(handle_get).put(handle_put).delete(handle_delete),
        )
        .route(
            "/internal/kv/:key",
            get(handle_internal_get).put(handle_internal_put),
        )
        .route("/metrics", get(handle_metrics))
        .route("/status", get(handle_status))
        .with_state(state)
}

/// Serve the router on a pre-bound listener. Binding is the caller's job
/// so tests can reserve port 0 and learn the address first.
pub async fn serve_on(listener: TcpListener, state: AppState) -> DriftResult<()> {
    axum::serve(listener, router(state))
        .await
        .map_err(|e| DriftError::Network(format!("server error: {}", e)))
}

/// Bind and serve.
pub async fn serve(addr: &str, state: AppState) -> DriftResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| DriftError::Network(format!("failed to bind {}: {}", addr, e)))?;
    serve_on(listener, state).await
}

// Request / response bodies.

#[derive(Debug, Deserialize)]
struct PutRequest {
    value: JsonValue,
    #[serde(rename = "N")]
    n: Option<usize>,
    #[serde(rename = "W")]
    w: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DeleteRequest {
    #[serde(rename = "N")]
    n: Option<usize>,
    #[serde(rename = "W")]
    w: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    #[serde(rename = "R")]
    r: Option<usize>,
    #[serde(rename = "N")]
    n: Option<usize>,
}

#[derive(Debug, Serialize)]
struct WriteResponse {
    success: bool,
}

#[derive(Debug, Serialize)]
struct VersionsResponse {
    versions: Vec<crate::types::Version>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    node_id: String,
    nodes: Vec<String>,
    key_count: usize,
    version_count: usize,
    failed_nodes: Vec<String>,
    consistency_level: &'static str,
    uptime_seconds: i64,
}

type Rejection = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> Rejection {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn check_key(key: &str) -> Result<(), Rejection> {
    validate_key(key).map_err(|e| bad_request(e.to_string()))
}

fn check_write_quorum(n: usize, w: usize) -> Result<(), Rejection> {
    if validate_quorum_params(n, 1, w) {
        Ok(())
    } else {
        Err(bad_request("Invalid quorum parameters"))
    }
}

fn check_read_quorum(n: usize, r: usize) -> Result<(), Rejection> {
    if validate_quorum_params(n, r, 1) {
        Ok(())
    } else {
        Err(bad_request("Invalid quorum parameters"))
    }
}

// ---------- CLIENT-FACING API ----------

async fn handle_put(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<PutRequest>,
) -> Result<(StatusCode, Json<WriteResponse>), Rejection> {
    check_key(&key)?;
    let n = request.n.unwrap_or(state.settings.n);
    let w = request.w.unwrap_or(state.settings.w);
    check_write_quorum(n, w)?;

    let success = state.coordinator.put(&key, request.value, n, w).await;
    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(WriteResponse { success })))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<ReadParams>,
) -> Result<Json<VersionsResponse>, Rejection> {
    check_key(&key)?;
    let r = params.r.unwrap_or(state.settings.r);
    let n = params.n.unwrap_or(state.settings.n);
    check_read_quorum(n, r)?;

    let versions = state.coordinator.get(&key, r, n).await;
    Ok(Json(VersionsResponse { versions }))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<DeleteRequest>>,
) -> Result<(StatusCode, Json<WriteResponse>), Rejection> {
    check_key(&key)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let n = request.n.unwrap_or(state.settings.n);
    let w = request.w.unwrap_or(state.settings.w);
    check_write_quorum(n, w)?;

    let success = state.coordinator.delete(&key, n, w).await;
    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(WriteResponse { success })))
}

// ---------- INTERNAL NODE-TO-NODE API ----------

async fn handle_internal_put(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(version): Json<crate::types::Version>,
) -> Json<JsonValue> {
    apply_replica_write(state.coordinator.storage(), &key, version);
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_internal_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<VersionsResponse> {
    // ALL versions, tombstones included; filtering is the reading
    // coordinator's job.
    let versions = state.coordinator.storage().get_all(&key);
    Json(VersionsResponse { versions })
}

// ---------- OBSERVABILITY ----------

async fn handle_metrics(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.summary())
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let storage = state.coordinator.storage();
    Json(StatusResponse {
        node_id: state.coordinator.node_id().to_string(),
        nodes: state.ring_nodes.clone(),
        key_count: storage.key_count(),
        version_count: storage.version_count(),
        failed_nodes: state.failures.failed_nodes(),
        consistency_level: state.settings.consistency_level(),
        uptime_seconds: (Utc::now() - state.metrics.started_at()).num_seconds(),
    })
}
