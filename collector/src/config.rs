//! CLI flags and environment-variable fallbacks for the collector.
//!
//! Mirrors `microview-nic.py`'s `argparse` surface and `defaults.py`'s
//! `get_env` pattern, following the same `env_or` shape used by the host
//! agent.

use clap::Parser;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Parser)]
#[command(name = "collector", about = "Microview collector: remote RDMA metrics reader, LMAP scheduler, classifiers")]
pub struct Cli {
    /// Control plane "host:port" to connect to.
    #[arg(long, short = 'c')]
    pub control_plane: String,

    /// Local scrape interval in seconds; 0 busy-loops with no sleep.
    #[arg(long, short = 's', default_value_t = 1.0)]
    pub scrape_interval: f64,

    /// Number of LMAP collectors (and queue pairs) to create.
    #[arg(long, short = 'l', default_value_t = 1)]
    pub lmaps: usize,

    /// Classifier model: threshold, subspace (alias fd/sketch), or vae.
    #[arg(long, short = 'm', default_value = "fd")]
    pub model: String,

    /// RDMA device name.
    #[arg(long, short = 'd')]
    pub dev: Option<String>,

    /// RDMA IB port.
    #[arg(long)]
    pub ib_port: Option<u8>,

    /// RDMA GID index.
    #[arg(long)]
    pub gid: Option<u8>,

    /// Per-request RDMA READ completion poll timeout, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub read_timeout_ms: u64,

    /// Directory to write one `stats_<collector_id>.csv` per LMAP into on shutdown.
    #[arg(long)]
    pub dump_stats: Option<String>,

    /// Enable debug logging (overrides --log-level).
    #[arg(long)]
    pub debug: bool,

    /// Logging level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub control_plane: String,
    pub scrape_interval: std::time::Duration,
    pub lmaps: usize,
    pub model: String,
    pub rdma_device: String,
    pub ib_port: u8,
    pub gid_index: u8,
    pub read_timeout: std::time::Duration,
    pub dump_stats: Option<String>,
    pub log_level: String,
}

pub const DEFAULT_RDMA_DEVICE: &str = "mlx5_1";
pub const DEFAULT_IB_PORT: u8 = 1;
pub const DEFAULT_GID_INDEX: u8 = 3;

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            control_plane: cli.control_plane,
            scrape_interval: std::time::Duration::from_secs_f64(cli.scrape_interval.max(0.0)),
            lmaps: cli.lmaps.max(1),
            model: cli.model,
            rdma_device: cli.dev.unwrap_or_else(|| env_or("RDMA_DEVICE", DEFAULT_RDMA_DEVICE.to_string())),
            ib_port: cli.ib_port.unwrap_or_else(|| env_or("IB_PORT", DEFAULT_IB_PORT)),
            gid_index: cli.gid.unwrap_or_else(|| env_or("GID", DEFAULT_GID_INDEX)),
            read_timeout: std::time::Duration::from_millis(cli.read_timeout_ms),
            dump_stats: cli.dump_stats,
            log_level: if cli.debug { "debug".to_string() } else { cli.log_level },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_overrides_log_level() {
        let cli = Cli::parse_from(["collector", "-c", "host:5000", "--debug"]);
        let cfg: Config = cli.into();
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn lmaps_defaults_to_at_least_one() {
        let cli = Cli::parse_from(["collector", "-c", "host:5000", "--lmaps", "0"]);
        let cfg: Config = cli.into();
        assert_eq!(cfg.lmaps, 1);
    }

    #[test]
    fn explicit_values_are_respected() {
        let cli = Cli::parse_from([
            "collector", "-c", "host:5000", "--lmaps", "4", "--dev", "mlx5_0", "--ib-port", "2", "--gid", "1",
        ]);
        let cfg: Config = cli.into();
        assert_eq!(cfg.lmaps, 4);
        assert_eq!(cfg.rdma_device, "mlx5_0");
        assert_eq!(cfg.ib_port, 2);
        assert_eq!(cfg.gid_index, 1);
    }
}
