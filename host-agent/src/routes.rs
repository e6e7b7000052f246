//! The host agent's HTTP+JSON control API, matching spec §6 1:1: the
//! distilled spec's "representative HTTP+JSON" bullet list is, here, an
//! actually running `axum` server — the part of the original Flask app
//! (`microview-host.py`) the distillation summarized away.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use control_proto::{
    ConnectQueuePairsRequest, ConnectQueuePairsResponse, ConnectResult, HealthResponse,
    MrDescriptor, PageLayoutEntry, QpDescriptor, RegisterMetricRequest, RegisterMetricResponse,
};
use memory_plane::MemoryPlaneError;
use metrics_codec::RecordType;
use rdma_fabric::QpEndpoint;
use serde_json::json;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", post(create_metric).get(get_memory_layout))
        .route("/rdma/qps", get(get_queue_pairs))
        .route("/rdma/qps/connect", post(connect_queue_pairs))
        .route("/rdma/mrs", get(get_memory_regions))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn create_metric(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterMetricRequest>,
) -> impl IntoResponse {
    let ty = match RecordType::try_from(req.ty) {
        Ok(ty) => ty,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("invalid type: {}", req.ty) })))
                .into_response()
        }
    };

    match state.pool.allocate_metric(&req.microservice_id, req.name.as_bytes(), ty, req.value) {
        Ok(addr) => {
            let body = RegisterMetricResponse { shm_name: state.pool.shm_name().to_string(), addr };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(MemoryPlaneError::NameTooLong(name)) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("metric name too long: {name}") }))).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() }))).into_response(),
    }
}

async fn get_memory_layout(State(state): State<Arc<AppState>>) -> Json<Vec<Vec<PageLayoutEntry>>> {
    let regions = state.pool.control_region();
    let out = regions
        .into_iter()
        .map(|mr| {
            mr.into_iter()
                .map(|p| PageLayoutEntry { pod_id: p.pod_id, num_metrics: p.occupancy, page_size_bytes: p.page_size })
                .collect()
        })
        .collect();
    Json(out)
}

async fn get_queue_pairs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(rdma) = &state.rdma else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "RDMA server not running" }))).into_response();
    };
    let qp_pool = rdma.qp_pool.lock();
    let qps: Vec<QpDescriptor> = (0..qp_pool.len())
        .map(|i| {
            let ep = qp_pool.local_endpoint(i).expect("index in range");
            QpDescriptor { qp_num: ep.qp_num, gid: ep.gid, psn: ep.psn, in_use: qp_pool.in_use(i).unwrap_or(false) }
        })
        .collect();
    (StatusCode::OK, Json(qps)).into_response()
}

async fn connect_queue_pairs(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectQueuePairsRequest>,
) -> impl IntoResponse {
    let Some(rdma) = &state.rdma else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "RDMA server not running" }))).into_response();
    };
    let mut qp_pool = rdma.qp_pool.lock();
    let results: Vec<ConnectResult> = req
        .queue_pairs
        .into_iter()
        .enumerate()
        .map(|(index, remote)| {
            let endpoint = QpEndpoint { qp_num: remote.qp_num, gid: remote.gid, psn: remote.psn };
            match qp_pool.connect(index, endpoint) {
                Ok(()) => ConnectResult { index, ok: true, error: None },
                Err(err) => ConnectResult { index, ok: false, error: Some(err.to_string()) },
            }
        })
        .collect();
    let status = if results.iter().any(|r| r.ok) { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
    (status, Json(ConnectQueuePairsResponse { results })).into_response()
}

async fn get_memory_regions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(rdma) = &state.rdma else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "RDMA MR not yet initialized" }))).into_response();
    };
    let mrs: Vec<MrDescriptor> = rdma
        .mrs
        .iter()
        .map(|m| MrDescriptor {
            name: m.name.clone(),
            addr: m.region.addr as u64,
            rkey: m.region.rkey,
            size: m.region.length,
        })
        .collect();
    (StatusCode::OK, Json(mrs)).into_response()
}
