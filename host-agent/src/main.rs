//! Host agent: owns the shared-memory metrics plane and the control API
//! a remote collector uses to discover its layout and bring up RDMA.
//!
//! Teardown order on SIGINT/SIGTERM matches spec §5: tear down QPs
//! first, then free MRs, then unlink the shared-memory segment — in
//! that order so nothing remote-readable outlives its registration.

mod config;
mod routes;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Cli, Config};
use memory_plane::MetricsPool;
use rdma_fabric::{FabricError, QueuePairPool, RdmaDevice};
use state::{AppState, NamedMr, RdmaState};
use std::sync::Arc;

fn init_logging(level: &str) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        builder.parse_filters(level);
    }
    builder.init();
}

/// Attempt to bring up RDMA: open the device, create a QP pool sized
/// `rdma_queues`, and register one MR per pool slot. Matches the
/// source's `_init_rdma`, except a missing hardware feature is treated
/// as "RDMA disabled" rather than a fatal error, so the rest of the
/// control API still runs on a dev machine with no RDMA NIC.
fn try_init_rdma(cfg: &Config, pool: &MetricsPool) -> Result<Option<RdmaState>> {
    if cfg.rdma_queues == 0 {
        log::info!("RDMA disabled (--rdma-queues 0)");
        return Ok(None);
    }

    let device = match RdmaDevice::open(&cfg.rdma_device) {
        Ok(device) => device,
        Err(FabricError::NotAvailable) => {
            log::warn!("RDMA hardware support not compiled in; serving control API without RDMA routes");
            return Ok(None);
        }
        Err(err) => return Err(err).context("opening RDMA device"),
    };

    let qp_pool = match QueuePairPool::new(device.clone(), cfg.rdma_queues, 64, cfg.ib_port, cfg.gid_index) {
        Ok(pool) => pool,
        Err(FabricError::NotAvailable) => {
            log::warn!("RDMA hardware support not compiled in; serving control API without RDMA routes");
            return Ok(None);
        }
        Err(err) => return Err(err).context("creating QP pool"),
    };

    let mut mrs = Vec::new();
    for slot in pool.mr_layout() {
        let region = device.register_memory(slot.addr, slot.size).context("registering memory region")?;
        mrs.push(NamedMr { name: format!("RDMA-MR-{}", slot.index), region });
    }

    log::info!("RDMA initialized: device={}, qps={}, mrs={}", cfg.rdma_device, cfg.rdma_queues, mrs.len());
    Ok(Some(RdmaState { qp_pool: parking_lot::Mutex::new(qp_pool), mrs, device }))
}

fn dump_layout_if_requested(cfg: &Config, pool: &MetricsPool, rdma: &Option<RdmaState>) -> Result<()> {
    let Some(path) = &cfg.dump_layout else { return Ok(()) };
    let layout = pool.control_region();
    let qps: Vec<_> = rdma
        .as_ref()
        .map(|r| {
            let qp_pool = r.qp_pool.lock();
            (0..qp_pool.len())
                .map(|i| qp_pool.local_endpoint(i).expect("index in range"))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let doc = serde_json::json!({ "memory_layout": layout.len(), "page_size": pool.page_size(), "mr_size": pool.mr_size(), "qp_count": qps.len() });
    std::fs::write(path, serde_json::to_string_pretty(&doc)?).with_context(|| format!("writing layout dump to {path}"))?;
    log::info!("wrote layout dump to {path}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let cfg: Config = cli.into();

    let pool = Arc::new(
        MetricsPool::create(&cfg.shm_name, cfg.pool_size, cfg.page_size, cfg.mr_size)
            .context("creating shared-memory metrics pool")?,
    );

    let rdma = try_init_rdma(&cfg, &pool)?;
    dump_layout_if_requested(&cfg, &pool, &rdma)?;

    let state = Arc::new(AppState { rdma, pool });
    let app = routes::router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    log::info!("starting host agent control API on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.context("serving control API")?;

    log::info!("host agent shut down");
    Ok(())
}

/// Waits for SIGINT or SIGTERM. Teardown itself happens as `AppState`
/// (and the `MetricsPool`/`RdmaState` it owns) drops when `main` returns
/// after this future resolves: QPs first, then MRs, then the shm unlink.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, tearing down");
}
