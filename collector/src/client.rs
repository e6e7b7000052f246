//! Blocking HTTP+JSON client for the host agent's control API.
//!
//! Synchronous `reqwest`, matching the source's synchronous `requests`
//! usage in `microview-nic.py`: each LMAP thread drives its own blocking
//! scrape loop, so nothing here needs to be async.

use crate::errors::CollectorError;
use control_proto::{
    ConnectQueuePairsRequest, ConnectQueuePairsResponse, HealthResponse, MrDescriptor, PageLayoutEntry, QpDescriptor,
};

pub struct ControlClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl ControlClient {
    pub fn new(control_plane: &str) -> Self {
        Self { base_url: format!("http://{control_plane}"), http: reqwest::blocking::Client::new() }
    }

    pub fn health(&self) -> Result<HealthResponse, CollectorError> {
        Ok(self.http.get(format!("{}/health", self.base_url)).send()?.error_for_status()?.json()?)
    }

    pub fn local_queue_pairs(&self) -> Result<Vec<QpDescriptor>, CollectorError> {
        Ok(self.http.get(format!("{}/rdma/qps", self.base_url)).send()?.error_for_status()?.json()?)
    }

    pub fn connect_queue_pairs(&self, req: &ConnectQueuePairsRequest) -> Result<ConnectQueuePairsResponse, CollectorError> {
        Ok(self
            .http
            .post(format!("{}/rdma/qps/connect", self.base_url))
            .json(req)
            .timeout(std::time::Duration::from_secs(10))
            .send()?
            .error_for_status()?
            .json()?)
    }

    pub fn memory_regions(&self) -> Result<Vec<MrDescriptor>, CollectorError> {
        Ok(self.http.get(format!("{}/rdma/mrs", self.base_url)).send()?.error_for_status()?.json()?)
    }

    pub fn metrics_layout(&self) -> Result<Vec<Vec<PageLayoutEntry>>, CollectorError> {
        Ok(self.http.get(format!("{}/metrics", self.base_url)).send()?.error_for_status()?.json()?)
    }
}
