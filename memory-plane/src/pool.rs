//! The page pool: allocates fixed-size pages to producers inside one
//! shared-memory segment, and tracks per-page occupancy out-of-band so page
//! bytes past the reported occupancy are never load-bearing.

use crate::errors::MemoryPlaneError;
use crate::shm::ShmSegment;
use metrics_codec::{encode_record, RecordType, NAME_LEN, RECORD_SIZE};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Per-page bookkeeping kept in the control plane, never in page bytes.
#[derive(Debug, Clone)]
pub struct PageDescriptor {
    pub pod_id: String,
    pub occupancy: usize,
    pub page_size: usize,
}

/// One MR's worth of (address, size), handed to the RDMA layer by the
/// caller to register for remote access.
#[derive(Debug, Clone, Copy)]
pub struct MrSlot {
    pub index: usize,
    pub addr: *mut u8,
    pub size: usize,
}

unsafe impl Send for MrSlot {}

struct PoolState {
    allocated_pages: usize,
    page_pod: Vec<String>,
    occupancy: Vec<usize>,
    pod_pages: HashMap<String, Vec<usize>>,
}

/// The host-side metrics page pool backed by one shared-memory segment.
///
/// Pages are packed into MRs sequentially: page `i` belongs to MR
/// `floor(i * page_size / mr_size)`. All mutation (allocation and the
/// initial record write) is serialized through an internal lock; the
/// fast path a producer uses afterward — an 8-byte value store at a
/// fixed offset — is outside this type's API entirely, as the spec's
/// concurrency model only requires that single write to be atomic, not
/// coordinated with this pool.
pub struct MetricsPool {
    shm: ShmSegment,
    page_size: usize,
    mr_size: usize,
    capacity_per_page: usize,
    max_pages: usize,
    state: Mutex<PoolState>,
}

impl MetricsPool {
    pub fn create(
        shm_name: &str,
        pool_size: usize,
        page_size: usize,
        mr_size: usize,
    ) -> Result<Self, MemoryPlaneError> {
        if mr_size % page_size != 0 {
            return Err(MemoryPlaneError::MrMisaligned { mr_size, page_size });
        }
        let shm = ShmSegment::create(shm_name, pool_size)?;
        let capacity_per_page = page_size / RECORD_SIZE;
        let max_pages = pool_size / page_size;
        log::info!(
            "metrics pool '{shm_name}': {max_pages} pages of {page_size}B ({capacity_per_page} records/page), mr_size={mr_size}B"
        );
        Ok(Self {
            shm,
            page_size,
            mr_size,
            capacity_per_page,
            max_pages,
            state: Mutex::new(PoolState {
                allocated_pages: 0,
                page_pod: Vec::new(),
                occupancy: Vec::new(),
                pod_pages: HashMap::new(),
            }),
        })
    }

    pub fn shm_name(&self) -> &str {
        self.shm.name()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn mr_size(&self) -> usize {
        self.mr_size
    }

    fn num_mrs(&self) -> usize {
        self.shm.size() / self.mr_size
    }

    /// Registers (or reuses) a page for `pod_id` and writes the initial
    /// record, returning the absolute byte offset of the record's value
    /// field — the address a producer writes to thereafter.
    pub fn allocate_metric(
        &self,
        pod_id: &str,
        name: &[u8],
        ty: RecordType,
        initial: f64,
    ) -> Result<usize, MemoryPlaneError> {
        if name.len() > NAME_LEN {
            return Err(MemoryPlaneError::NameTooLong(String::from_utf8_lossy(name).into_owned()));
        }

        let mut state = self.state.lock();

        let page_index = match Self::find_non_full_page(&state, pod_id, self.capacity_per_page) {
            Some(idx) => idx,
            None => {
                if state.allocated_pages >= self.max_pages {
                    return Err(MemoryPlaneError::PoolExhausted { max_pages: self.max_pages });
                }
                let idx = state.allocated_pages;
                state.allocated_pages += 1;
                state.page_pod.push(pod_id.to_string());
                state.occupancy.push(0);
                state.pod_pages.entry(pod_id.to_string()).or_default().push(idx);
                log::debug!("allocated page {idx} for pod '{pod_id}'");
                idx
            }
        };

        let record_index = state.occupancy[page_index];
        let page_offset = page_index * self.page_size;
        let record_offset = page_offset + record_index * RECORD_SIZE;

        let record = encode_record(name, ty, initial);
        unsafe {
            let dst = self.shm.base_addr().add(record_offset);
            std::ptr::copy_nonoverlapping(record.as_ptr(), dst, RECORD_SIZE);
        }
        state.occupancy[page_index] += 1;

        // Value field sits after the 55-byte name and 1-byte type.
        Ok(record_offset + NAME_LEN + 1)
    }

    fn find_non_full_page(state: &PoolState, pod_id: &str, capacity: usize) -> Option<usize> {
        state
            .pod_pages
            .get(pod_id)
            .and_then(|pages| pages.iter().copied().find(|&idx| state.occupancy[idx] < capacity))
    }

    /// Page descriptors grouped by MR index, pages ordered by offset
    /// within their MR — matches the byte order a remote READ of that MR
    /// yields.
    pub fn control_region(&self) -> Vec<Vec<PageDescriptor>> {
        let state = self.state.lock();
        let mut regions: Vec<Vec<PageDescriptor>> = vec![Vec::new(); self.num_mrs()];
        for idx in 0..state.allocated_pages {
            let mr_index = (idx * self.page_size) / self.mr_size;
            regions[mr_index].push(PageDescriptor {
                pod_id: state.page_pod[idx].clone(),
                occupancy: state.occupancy[idx],
                page_size: self.page_size,
            });
        }
        regions
    }

    /// Address/size of every MR slot in the pool, for the caller to hand
    /// to the RDMA layer's memory registration.
    pub fn mr_layout(&self) -> Vec<MrSlot> {
        (0..self.num_mrs())
            .map(|i| MrSlot {
                index: i,
                addr: unsafe { self.shm.base_addr().add(i * self.mr_size) },
                size: self.mr_size,
            })
            .collect()
    }

    pub fn base_addr(&self) -> *mut u8 {
        self.shm.base_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(name: &str) -> MetricsPool {
        MetricsPool::create(name, 4 * 4096, 4096, 4096).expect("create pool")
    }

    #[test]
    fn first_registration_on_a_fresh_page_lands_on_the_value_field_offset() {
        // page_size=128, mr_size=128: the first record's value field sits
        // right after the 55-byte name and 1-byte type, at offset 56.
        let p = MetricsPool::create(&format!("/mp-test-s1-{}", std::process::id()), 128, 128, 128).unwrap();
        let offset = p.allocate_metric("A", b"rps", RecordType::Counter, 0.0).unwrap();
        assert_eq!(offset, 56);
        let regions = p.control_region();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].len(), 1);
        assert_eq!(regions[0][0].pod_id, "A");
        assert_eq!(regions[0][0].occupancy, 1);
        assert_eq!(regions[0][0].page_size, 128);
    }

    #[test]
    fn allocate_metric_reuses_non_full_page() {
        let p = pool(&format!("/mp-test-reuse-{}", std::process::id()));
        let off1 = p.allocate_metric("pod-a", b"requests_total", RecordType::Counter, 0.0).unwrap();
        let off2 = p.allocate_metric("pod-a", b"latency_ms", RecordType::Gauge, 1.5).unwrap();
        assert_eq!(off2 - off1, RECORD_SIZE);
        let regions = p.control_region();
        let total_pages: usize = regions.iter().map(|r| r.len()).sum();
        assert_eq!(total_pages, 1);
        assert_eq!(regions.iter().flatten().next().unwrap().occupancy, 2);
    }

    #[test]
    fn allocate_metric_new_page_on_full() {
        let p = MetricsPool::create(
            &format!("/mp-test-full-{}", std::process::id()),
            2 * 128,
            128,
            128,
        )
        .unwrap();
        let capacity = 128 / RECORD_SIZE;
        for i in 0..capacity {
            p.allocate_metric("pod-a", format!("m{i}").as_bytes(), RecordType::Gauge, 0.0).unwrap();
        }
        // page is now full; next allocation must land on a new page
        p.allocate_metric("pod-a", b"overflow", RecordType::Gauge, 0.0).unwrap();
        let regions = p.control_region();
        let total_pages: usize = regions.iter().map(|r| r.len()).sum();
        assert_eq!(total_pages, 2);
    }

    #[test]
    fn pool_exhausted_when_no_pages_left() {
        let p = MetricsPool::create(&format!("/mp-test-exhaust-{}", std::process::id()), 128, 128, 128).unwrap();
        p.allocate_metric("pod-a", b"m0", RecordType::Gauge, 0.0).unwrap();
        let err = p.allocate_metric("pod-b", b"m1", RecordType::Gauge, 0.0);
        assert!(matches!(err, Err(MemoryPlaneError::PoolExhausted { .. })));
    }

    #[test]
    fn mr_misaligned_rejected_at_creation() {
        let err = MetricsPool::create(&format!("/mp-test-misaligned-{}", std::process::id()), 4096, 100, 4096);
        assert!(matches!(err, Err(MemoryPlaneError::MrMisaligned { .. })));
    }

    #[test]
    fn control_region_groups_pages_by_mr_in_offset_order() {
        let p = MetricsPool::create(&format!("/mp-test-mrgroup-{}", std::process::id()), 4 * 128, 128, 256).unwrap();
        let capacity = 128 / RECORD_SIZE;
        // Fill enough pages to span two MRs (mr_size=256 => 2 pages/MR).
        for page in 0..3 {
            for i in 0..capacity {
                p.allocate_metric(&format!("pod-{page}"), format!("m{i}").as_bytes(), RecordType::Gauge, 0.0)
                    .unwrap();
            }
        }
        let regions = p.control_region();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].len(), 2);
        assert_eq!(regions[1].len(), 1);
    }
}
