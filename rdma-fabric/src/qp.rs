//! Queue-pair lifecycle: creation, the `Created -> Init -> Rtr -> Rts`
//! connect state machine, and the pool that groups QPs sharing one
//! completion queue.
//!
//! This is the single canonical queue-pair pool: the original
//! implementation this is distilled from carried two near-identical
//! `QueuePairPool` variants (one used by the host, one by the collector).
//! There is exactly one type here, used by both sides.

use crate::errors::FabricError;
use crate::device::RdmaDevice;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "hardware")]
use crate::ffi::*;
#[cfg(feature = "hardware")]
use std::ptr;

/// Endpoint information exchanged between host and collector to bring up a
/// queue pair: this is the wire-level identity of one QP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QpEndpoint {
    pub qp_num: u32,
    pub gid: [u8; 16],
    pub psn: u32,
}

/// Where a queue pair sits in its connect state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpState {
    Created,
    Init,
    Rtr,
    Rts,
}

/// One RC (reliable connection) queue pair plus its local identity.
pub struct QueuePair {
    #[cfg(feature = "hardware")]
    qp: *mut ibv_qp,
    local_endpoint: QpEndpoint,
    remote_endpoint: Option<QpEndpoint>,
    state: QpState,
    in_use: bool,
}

unsafe impl Send for QueuePair {}
unsafe impl Sync for QueuePair {}

impl QueuePair {
    pub fn local_endpoint(&self) -> QpEndpoint {
        self.local_endpoint
    }

    pub fn state(&self) -> QpState {
        self.state
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }

    #[cfg(feature = "hardware")]
    fn to_init(&mut self, device: &RdmaDevice, port_num: u8) -> Result<(), FabricError> {
        let mut attr: ibv_qp_attr = unsafe { std::mem::zeroed() };
        attr.qp_state = ibv_qp_state::IBV_QPS_INIT;
        attr.pkey_index = 0;
        attr.port_num = port_num;
        attr.qp_access_flags =
            (IBV_ACCESS_REMOTE_READ | IBV_ACCESS_REMOTE_WRITE | IBV_ACCESS_LOCAL_WRITE) as u32;
        let mask = ibv_qp_attr_mask::IBV_QP_STATE
            | ibv_qp_attr_mask::IBV_QP_PKEY_INDEX
            | ibv_qp_attr_mask::IBV_QP_PORT
            | ibv_qp_attr_mask::IBV_QP_ACCESS_FLAGS;
        let ret = unsafe { ibv_modify_qp(self.qp, &mut attr, mask.0 as i32) };
        if ret != 0 {
            return Err(FabricError::QpTransitionFailed("INIT"));
        }
        let _ = device;
        self.state = QpState::Init;
        Ok(())
    }

    #[cfg(feature = "hardware")]
    fn to_rtr(&mut self, remote: &QpEndpoint, port_num: u8, gid_index: u8) -> Result<(), FabricError> {
        let mut attr: ibv_qp_attr = unsafe { std::mem::zeroed() };
        attr.qp_state = ibv_qp_state::IBV_QPS_RTR;
        attr.path_mtu = ibv_mtu::IBV_MTU_4096;
        attr.dest_qp_num = remote.qp_num;
        attr.rq_psn = remote.psn;
        attr.max_dest_rd_atomic = 1;
        attr.min_rnr_timer = 12;
        attr.ah_attr.port_num = port_num;
        attr.ah_attr.is_global = 1;
        attr.ah_attr.grh.dgid.raw = remote.gid;
        attr.ah_attr.grh.sgid_index = gid_index;
        attr.ah_attr.grh.hop_limit = 64;

        let mask = ibv_qp_attr_mask::IBV_QP_STATE
            | ibv_qp_attr_mask::IBV_QP_AV
            | ibv_qp_attr_mask::IBV_QP_PATH_MTU
            | ibv_qp_attr_mask::IBV_QP_DEST_QPN
            | ibv_qp_attr_mask::IBV_QP_RQ_PSN
            | ibv_qp_attr_mask::IBV_QP_MAX_DEST_RD_ATOMIC
            | ibv_qp_attr_mask::IBV_QP_MIN_RNR_TIMER;
        let ret = unsafe { ibv_modify_qp(self.qp, &mut attr, mask.0 as i32) };
        if ret != 0 {
            return Err(FabricError::QpTransitionFailed("RTR"));
        }
        self.state = QpState::Rtr;
        Ok(())
    }

    #[cfg(feature = "hardware")]
    fn to_rts(&mut self) -> Result<(), FabricError> {
        let mut attr: ibv_qp_attr = unsafe { std::mem::zeroed() };
        attr.qp_state = ibv_qp_state::IBV_QPS_RTS;
        attr.sq_psn = self.local_endpoint.psn;
        attr.timeout = 14;
        attr.retry_cnt = 7;
        attr.rnr_retry = 7;
        attr.max_rd_atomic = 1;
        let mask = ibv_qp_attr_mask::IBV_QP_STATE
            | ibv_qp_attr_mask::IBV_QP_TIMEOUT
            | ibv_qp_attr_mask::IBV_QP_RETRY_CNT
            | ibv_qp_attr_mask::IBV_QP_RNR_RETRY
            | ibv_qp_attr_mask::IBV_QP_SQ_PSN
            | ibv_qp_attr_mask::IBV_QP_MAX_QP_RD_ATOMIC;
        let ret = unsafe { ibv_modify_qp(self.qp, &mut attr, mask.0 as i32) };
        if ret != 0 {
            return Err(FabricError::QpTransitionFailed("RTS"));
        }
        self.state = QpState::Rts;
        Ok(())
    }

    #[cfg(feature = "hardware")]
    pub(crate) fn raw(&self) -> *mut ibv_qp {
        self.qp
    }
}

impl Drop for QueuePair {
    fn drop(&mut self) {
        #[cfg(feature = "hardware")]
        unsafe {
            if !self.qp.is_null() {
                ibv_destroy_qp(self.qp);
            }
        }
    }
}

/// Outcome of a polled completion, keyed by `wr_id` so the pool's shared
/// CQ can be safely drained by whichever LMAP thread happens to call
/// [`QueuePairPool::wait_for_completion`] next, without that thread
/// stealing a sibling LMAP's completion.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CompletionOutcome {
    Success,
    Failed(u32),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum CompletionWaitError {
    PollFailed,
    Timeout,
}

/// A pool of RC queue pairs sharing one completion queue, plus the
/// protection domain and device they're bound to. The default deployment
/// creates one QP per LMAP against this single shared CQ, so polling for
/// one QP's completion must not discard another's; see
/// `wait_for_completion`.
pub struct QueuePairPool {
    device: Arc<RdmaDevice>,
    #[cfg(feature = "hardware")]
    cq: *mut ibv_cq,
    port_num: u8,
    gid_index: u8,
    qps: Vec<QueuePair>,
    /// Completions dequeued from `cq` for a `wr_id` nobody was waiting on
    /// yet, stashed here for whichever thread asks for it next.
    completions: Mutex<HashMap<u64, CompletionOutcome>>,
}

unsafe impl Send for QueuePairPool {}
unsafe impl Sync for QueuePairPool {}

impl QueuePairPool {
    #[cfg(feature = "hardware")]
    pub fn new(
        device: Arc<RdmaDevice>,
        pool_size: usize,
        cq_depth: u32,
        port_num: u8,
        gid_index: u8,
    ) -> Result<Self, FabricError> {
        info!("creating queue pair pool: size={pool_size}, cq_depth={cq_depth}");

        let cq = unsafe {
            ibv_create_cq(device.context(), cq_depth as i32, ptr::null_mut(), ptr::null_mut(), 0)
        };
        if cq.is_null() {
            return Err(FabricError::CqCreateFailed);
        }

        let port = device.query_port(port_num, gid_index)?;

        let mut qps = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let mut qp_init_attr: ibv_qp_init_attr = unsafe { std::mem::zeroed() };
            qp_init_attr.send_cq = cq;
            qp_init_attr.recv_cq = cq;
            qp_init_attr.qp_type = ibv_qp_type::IBV_QPT_RC;
            qp_init_attr.cap.max_send_wr = cq_depth;
            qp_init_attr.cap.max_recv_wr = cq_depth;
            qp_init_attr.cap.max_send_sge = 1;
            qp_init_attr.cap.max_recv_sge = 1;

            let raw_qp = unsafe { ibv_create_qp(device.pd(), &mut qp_init_attr) };
            if raw_qp.is_null() {
                unsafe { ibv_destroy_cq(cq) };
                return Err(FabricError::QpCreateFailed);
            }
            let qp_num = unsafe { (*raw_qp).qp_num };

            let mut qp = QueuePair {
                qp: raw_qp,
                local_endpoint: QpEndpoint {
                    qp_num,
                    gid: port.gid,
                    psn: rand::random::<u32>() & 0x00ff_ffff,
                },
                remote_endpoint: None,
                state: QpState::Created,
                in_use: false,
            };
            qp.to_init(&device, port_num)?;
            debug!("created QP #{i}: qp_num={qp_num}");
            qps.push(qp);
        }

        Ok(Self {
            device,
            cq,
            port_num,
            gid_index,
            qps,
            completions: Mutex::new(HashMap::new()),
        })
    }

    #[cfg(not(feature = "hardware"))]
    pub fn new(
        _device: Arc<RdmaDevice>,
        _pool_size: usize,
        _cq_depth: u32,
        _port_num: u8,
        _gid_index: u8,
    ) -> Result<Self, FabricError> {
        Err(FabricError::NotAvailable)
    }

    pub fn len(&self) -> usize {
        self.qps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.qps.is_empty()
    }

    pub fn local_endpoint(&self, index: usize) -> Result<QpEndpoint, FabricError> {
        self.qps
            .get(index)
            .map(|qp| qp.local_endpoint())
            .ok_or(FabricError::QpIndexOutOfRange(index, self.qps.len()))
    }

    pub fn in_use(&self, index: usize) -> Result<bool, FabricError> {
        self.qps
            .get(index)
            .map(|qp| qp.in_use())
            .ok_or(FabricError::QpIndexOutOfRange(index, self.qps.len()))
    }

    /// Transition queue pair `index` through RTR then RTS against `remote`.
    /// Rejects an already-`in_use` QP rather than silently reconnecting it.
    #[cfg(feature = "hardware")]
    pub fn connect(&mut self, index: usize, remote: QpEndpoint) -> Result<(), FabricError> {
        let len = self.qps.len();
        let qp = self
            .qps
            .get_mut(index)
            .ok_or(FabricError::QpIndexOutOfRange(index, len))?;
        if qp.in_use {
            warn!("queue pair #{index} is already in use, refusing reconnect");
            return Err(FabricError::QpInUse(index));
        }
        qp.to_rtr(&remote, self.port_num, self.gid_index)?;
        qp.to_rts()?;
        qp.remote_endpoint = Some(remote);
        qp.in_use = true;
        info!("queue pair #{index} connected, remote qp_num={}", remote.qp_num);
        Ok(())
    }

    #[cfg(not(feature = "hardware"))]
    pub fn connect(&mut self, _index: usize, _remote: QpEndpoint) -> Result<(), FabricError> {
        Err(FabricError::NotAvailable)
    }

    pub fn device(&self) -> &Arc<RdmaDevice> {
        &self.device
    }

    #[cfg(feature = "hardware")]
    pub(crate) fn qp_raw(&self, index: usize) -> Result<*mut ibv_qp, FabricError> {
        self.qps
            .get(index)
            .map(|qp| qp.raw())
            .ok_or(FabricError::QpIndexOutOfRange(index, self.qps.len()))
    }

    /// Blocks the calling thread until the completion for `wr_id` is
    /// available or `timeout` elapses, polling the pool's shared CQ under
    /// a lock so concurrent callers (one per LMAP) never race each other
    /// on `ibv_poll_cq`. A dequeued completion that belongs to a different
    /// `wr_id` is stashed rather than dropped, so the thread actually
    /// waiting for it picks it up on its own next poll instead of timing
    /// out.
    #[cfg(feature = "hardware")]
    pub(crate) fn wait_for_completion(&self, wr_id: u64, timeout: Duration) -> Result<CompletionOutcome, CompletionWaitError> {
        let deadline = deadline(timeout);
        loop {
            {
                let mut pending = self.completions.lock();
                if let Some(outcome) = pending.remove(&wr_id) {
                    return Ok(outcome);
                }

                let mut wc: ibv_wc = unsafe { std::mem::zeroed() };
                let n = unsafe { ibv_poll_cq(self.cq, 1, &mut wc) };
                if n < 0 {
                    return Err(CompletionWaitError::PollFailed);
                }
                if n > 0 {
                    let outcome = if wc.status == ibv_wc_status::IBV_WC_SUCCESS {
                        CompletionOutcome::Success
                    } else {
                        CompletionOutcome::Failed(wc.status as u32)
                    };
                    if wc.wr_id == wr_id {
                        return Ok(outcome);
                    }
                    pending.insert(wc.wr_id, outcome);
                    continue;
                }
            }
            if Instant::now() >= deadline {
                return Err(CompletionWaitError::Timeout);
            }
            std::thread::yield_now();
        }
    }
}

impl Drop for QueuePairPool {
    fn drop(&mut self) {
        #[cfg(feature = "hardware")]
        unsafe {
            if !self.cq.is_null() {
                ibv_destroy_cq(self.cq);
            }
        }
    }
}

/// Monotonic work-request id generator shared by every QP issuing RDMA
/// operations, so completions can be matched back to their post.
pub(crate) fn next_wr_id() -> u64 {
    static WR_ID: AtomicU64 = AtomicU64::new(1);
    WR_ID.fetch_add(1, Ordering::Relaxed)
}

/// A simple monotonic clock-based deadline, used by completion polling.
pub(crate) fn deadline(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_creation_without_hardware_feature_is_not_available() {
        #[cfg(not(feature = "hardware"))]
        {
            let device = RdmaDevice::open("mlx5_0");
            assert!(device.is_err());
        }
    }

    #[test]
    fn qp_index_out_of_range_is_reported() {
        #[cfg(not(feature = "hardware"))]
        {
            // Pool construction itself fails without hardware, but the
            // bounds-checking helper path is exercised directly here via
            // the error type's Display to keep this test hardware-free.
            let err = FabricError::QpIndexOutOfRange(5, 2);
            assert_eq!(err.to_string(), "queue pair index 5 out of range (pool size 2)");
        }
    }
}
