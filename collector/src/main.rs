//! Collector: connects to a host agent's control API, partitions the
//! metrics layout across LMAPs, and runs one dedicated scrape thread per
//! LMAP reading assigned memory regions one-sidedly over RDMA.

mod client;
mod config;
mod connect;
mod errors;
mod export;
mod lmap;
mod scheduler;
mod stats;

use anyhow::{Context, Result};
use classifiers::{ClassifierConfig, ClassifierModel};
use clap::Parser;
use client::ControlClient;
use config::{Cli, Config};
use control_proto::PageLayoutEntry;
use lmap::{Lmap, MrAssignment};
use rdma_fabric::{OneSidedReader, QueuePairPool, RdmaDevice, RemoteBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_logging(level: &str) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        builder.parse_filters(level);
    }
    builder.init();
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_shutdown_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Release);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_shutdown_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_shutdown_signal as libc::sighandler_t);
    }
}

fn build_assignments(
    groups: &[Vec<usize>],
    layout: &[Vec<PageLayoutEntry>],
    remote_mrs: &[RemoteBuffer],
) -> Vec<Vec<MrAssignment>> {
    groups
        .iter()
        .map(|indices| {
            indices
                .iter()
                .map(|&idx| MrAssignment { remote: remote_mrs[idx], pages: layout[idx].clone() })
                .collect()
        })
        .collect()
}

fn dump_stats(dir: &str, collector_id: &str, stats: &stats::ScrapeStats) -> Result<()> {
    let path = std::path::Path::new(dir).join(format!("stats_{collector_id}.csv"));
    let body = stats.to_csv_rows().join("\n") + "\n";
    std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let cfg: Config = cli.into();
    let model: ClassifierModel = cfg.model.parse().context("parsing --model")?;

    install_signal_handlers();

    let client = ControlClient::new(&cfg.control_plane);
    client.health().context("control plane health check failed")?;

    let device = RdmaDevice::open(&cfg.rdma_device).context("opening RDMA device")?;
    let mut qp_pool = QueuePairPool::new(device.clone(), cfg.lmaps, 64, cfg.ib_port, cfg.gid_index)
        .context("creating queue pair pool")?;

    let remote_mrs = connect::connect_with_host(&client, &mut qp_pool).context("connecting to host")?;
    let layout = client.metrics_layout().context("fetching metrics layout")?;
    if layout.len() != remote_mrs.len() {
        anyhow::bail!(
            "control info has {} memory regions but the host registered {}",
            layout.len(),
            remote_mrs.len()
        );
    }

    let active = scheduler::active_mr_indices(&layout);
    if active.is_empty() {
        anyhow::bail!("no active memory regions found");
    }
    let groups = scheduler::partition(&active, cfg.lmaps);
    let assignments = build_assignments(&groups, &layout, &remote_mrs);

    let base_config = ClassifierConfig::default();
    let running = Arc::new(AtomicBool::new(true));
    let poll_timeout = cfg.read_timeout;

    let mut lmaps = Vec::new();
    for (i, group) in assignments.into_iter().enumerate() {
        let qp_index = i % cfg.lmaps;
        let reader = OneSidedReader::new(&qp_pool, qp_index, poll_timeout);
        let mut lmap = Lmap::new(format!("LMAP_{i}"), reader, group, cfg.scrape_interval, running.clone());
        lmap.build_classifiers(model, &base_config).with_context(|| format!("building classifiers for LMAP_{i}"))?;
        lmaps.push(lmap);
    }

    log::info!("collector running with {} LMAPs against {}", lmaps.len(), cfg.control_plane);

    std::thread::scope(|scope| {
        let (done_txs, done_rxs): (Vec<_>, Vec<_>) = lmaps.iter().map(|_| crossbeam_channel::bounded::<()>(1)).unzip();
        let handles: Vec<_> = lmaps
            .into_iter()
            .zip(done_txs)
            .map(|(lmap, done_tx)| {
                scope.spawn(move || {
                    lmap.run();
                    let _ = done_tx.send(());
                    lmap
                })
            })
            .collect();

        while !SHUTDOWN.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(200));
        }
        log::info!("shutdown signal received, stopping LMAP threads");
        running.store(false, Ordering::Release);

        for rx in &done_rxs {
            if rx.recv_timeout(Duration::from_secs(5)).is_err() {
                log::warn!("an LMAP thread did not stop within 5s, waiting for it to finish");
            }
        }

        for handle in handles {
            match handle.join() {
                Ok(lmap) => {
                    if let Some(dir) = &cfg.dump_stats {
                        if let Err(err) = dump_stats(dir, lmap.collector_id(), lmap.stats()) {
                            log::warn!("failed to dump stats for {}: {err}", lmap.collector_id());
                        }
                    }
                }
                Err(_) => log::error!("an LMAP thread panicked"),
            }
        }
    });

    log::info!("collector shut down");
    Ok(())
}
