//! Wire DTOs shared between the host agent's HTTP control API and the
//! collector's control client. Plain `serde`-derived structs; no
//! behavior lives here.

use serde::{Deserialize, Serialize};

/// `POST /metrics` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMetricRequest {
    pub microservice_id: String,
    pub name: String,
    /// 0 = counter, 1 = gauge, matching [`metrics_codec::RecordType`]'s wire encoding.
    #[serde(rename = "type")]
    pub ty: u8,
    pub value: f64,
}

/// `POST /metrics` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMetricResponse {
    pub shm_name: String,
    pub addr: usize,
}

/// One entry of the `GET /metrics` response, grouped by MR in the
/// response's outer array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayoutEntry {
    pub pod_id: String,
    pub num_metrics: usize,
    pub page_size_bytes: usize,
}

/// `GET /rdma/qps` response entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QpDescriptor {
    pub qp_num: u32,
    pub gid: [u8; 16],
    pub psn: u32,
    pub in_use: bool,
}

/// `POST /rdma/qps/connect` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectQueuePairsRequest {
    pub queue_pairs: Vec<RemoteQp>,
}

/// One remote QP descriptor as exchanged during connect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RemoteQp {
    pub qp_num: u32,
    pub gid: [u8; 16],
    pub psn: u32,
}

/// Per-index result of a connect attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResult {
    pub index: usize,
    pub ok: bool,
    pub error: Option<String>,
}

/// `POST /rdma/qps/connect` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectQueuePairsResponse {
    pub results: Vec<ConnectResult>,
}

/// `GET /rdma/mrs` response entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrDescriptor {
    pub name: String,
    pub addr: u64,
    pub rkey: u32,
    pub size: usize,
}

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self { status: "ok".to_string() }
    }
}
