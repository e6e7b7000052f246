//! Process-wide state shared across the axum handlers: the shared-memory
//! pool and, if RDMA hardware is present, the QP pool and registered MRs.

use memory_plane::MetricsPool;
use parking_lot::Mutex;
use rdma_fabric::{MemoryRegion, QueuePairPool, RdmaDevice};
use std::sync::Arc;

/// One registered MR, named for the `GET /rdma/mrs` response.
pub struct NamedMr {
    pub name: String,
    pub region: MemoryRegion,
}

/// RDMA-side state, present only when `--rdma-queues` is nonzero and the
/// `hardware` feature of `rdma-fabric` is compiled in and a device opens
/// successfully.
/// Field order is teardown order (Rust drops struct fields top to
/// bottom): QPs destroyed first, then MRs deregistered, then the
/// device/PD `Arc` released last — matching spec §5's explicit
/// "tears down QPs first, then frees MRs" shutdown sequence.
pub struct RdmaState {
    pub qp_pool: Mutex<QueuePairPool>,
    pub mrs: Vec<NamedMr>,
    pub device: Arc<RdmaDevice>,
}

/// `rdma` is declared before `pool` so QP/MR teardown finishes before
/// the shared-memory segment unlinks, per spec §5's shutdown order.
pub struct AppState {
    pub rdma: Option<RdmaState>,
    pub pool: Arc<MetricsPool>,
}
