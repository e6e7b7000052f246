use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryPlaneError {
    #[error("shared memory name '{0}' is invalid")]
    InvalidShmName(String),

    #[error("shm_open failed: {0}")]
    ShmOpenFailed(#[source] std::io::Error),

    #[error("ftruncate failed: {0}")]
    ShmTruncateFailed(#[source] std::io::Error),

    #[error("mmap failed: {0}")]
    MmapFailed(#[source] std::io::Error),

    #[error("memory region size {mr_size} is not a multiple of page size {page_size}")]
    MrMisaligned { mr_size: usize, page_size: usize },

    #[error("page pool exhausted: no more page slots available ({max_pages} pages max)")]
    PoolExhausted { max_pages: usize },

    #[error("metric name '{0}' exceeds the maximum encodable length")]
    NameTooLong(String),
}
