use thiserror::Error;

/// Errors from the RDMA fabric layer. Per the system's error model, every
/// variant here is fatal to its owning caller (device/QP setup, or the
/// owning LMAP if raised out of a completion poll) — transient per-MR
/// timeouts are represented separately by [`crate::reader::ReadError`], which
/// a scrape loop can recover from without tearing anything down.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("RDMA hardware support not compiled in (build without --features hardware)")]
    NotAvailable,

    #[error("RDMA device '{0}' not found")]
    DeviceNotFound(String),

    #[error("failed to open RDMA device '{0}'")]
    DeviceOpenFailed(String),

    #[error("failed to allocate protection domain")]
    PdAllocFailed,

    #[error("failed to register memory region")]
    MrRegisterFailed,

    #[error("failed to query port {0}")]
    PortQueryFailed(u8),

    #[error("failed to create completion queue")]
    CqCreateFailed,

    #[error("failed to create queue pair")]
    QpCreateFailed,

    #[error("failed to transition queue pair to {0}")]
    QpTransitionFailed(&'static str),

    #[error("queue pair {0} is already in use")]
    QpInUse(usize),

    #[error("queue pair index {0} out of range (pool size {1})")]
    QpIndexOutOfRange(usize, usize),

    #[error("failed to post RDMA READ work request")]
    PostSendFailed,
}
