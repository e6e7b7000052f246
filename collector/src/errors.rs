use thiserror::Error;

/// Errors from bringing up the control-plane connection and RDMA fabric.
/// Unlike [`rdma_fabric::ReadError`], every variant here is fatal to
/// collector startup; recoverable per-scrape errors are handled and
/// logged inside the LMAP scrape loop instead of surfacing here.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("control plane request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Fabric(#[from] rdma_fabric::FabricError),

    #[error(transparent)]
    Classifier(#[from] classifiers::ConfigError),

    #[error("control info has {control_len} memory regions but the host registered {mr_len}")]
    LayoutMismatch { control_len: usize, mr_len: usize },

    #[error("no remote queue pairs received from control plane")]
    NoRemoteQueuePairs,

    #[error("no active memory regions found")]
    NoActiveMemoryRegions,

    #[error("queue pair connect failed for every index")]
    AllQueuePairsFailed,
}
