//! Bring-up protocol against the host's control API, matching
//! `connect_with_microview_host` in the source: create a local QP pool,
//! exchange endpoint descriptors, connect in pairs, then ask remotely
//! for the MR descriptors that back one-sided READs.

use crate::client::ControlClient;
use crate::errors::CollectorError;
use control_proto::{ConnectQueuePairsRequest, RemoteQp};
use rdma_fabric::{QpEndpoint, QueuePairPool, RemoteBuffer};

/// Connects every queue pair in `qp_pool` to its counterpart on the host
/// and returns the host's registered memory regions in order, so index
/// `i` here lines up with MR index `i` in the control-plane layout.
pub fn connect_with_host(client: &ControlClient, qp_pool: &mut QueuePairPool) -> Result<Vec<RemoteBuffer>, CollectorError> {
    let remote_qps = client.local_queue_pairs()?;
    if remote_qps.is_empty() {
        return Err(CollectorError::NoRemoteQueuePairs);
    }

    for (i, remote) in remote_qps.iter().enumerate() {
        if i >= qp_pool.len() {
            break;
        }
        if remote.in_use {
            log::warn!("queue pair {i} on host is already in use, attempting to connect anyway");
        }
        let endpoint = QpEndpoint { qp_num: remote.qp_num, gid: remote.gid, psn: remote.psn };
        qp_pool.connect(i, endpoint)?;
    }

    let local_qps: Vec<RemoteQp> = (0..qp_pool.len())
        .map(|i| {
            let ep = qp_pool.local_endpoint(i).expect("index in range");
            RemoteQp { qp_num: ep.qp_num, gid: ep.gid, psn: ep.psn }
        })
        .collect();

    let response = client.connect_queue_pairs(&ConnectQueuePairsRequest { queue_pairs: local_qps })?;
    if !response.results.iter().any(|r| r.ok) {
        return Err(CollectorError::AllQueuePairsFailed);
    }
    for result in &response.results {
        if !result.ok {
            log::warn!("host failed to connect queue pair {}: {:?}", result.index, result.error);
        }
    }

    let mrs = client.memory_regions()?;
    log::info!("connected: {} queue pairs, {} memory regions", qp_pool.len(), mrs.len());
    Ok(mrs.into_iter().map(|mr| RemoteBuffer { addr: mr.addr, rkey: mr.rkey, length: mr.size }).collect())
}
