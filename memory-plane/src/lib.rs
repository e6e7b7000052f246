//! Host-side shared-memory metrics plane: page allocation, pod→page
//! indexing, and the MR layout published to the collector.

mod errors;
mod pool;
mod shm;

pub use errors::MemoryPlaneError;
pub use pool::{MetricsPool, MrSlot, PageDescriptor};
pub use shm::ShmSegment;
