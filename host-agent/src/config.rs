//! CLI flags and environment-variable fallbacks for the host agent.
//!
//! Mirrors the source's `defaults.py::get_env` pattern: a flag left at
//! its clap default is re-read from the environment once, so either
//! surface can configure the process without the two drifting.

use clap::Parser;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Parser)]
#[command(name = "host-agent", about = "Microview host agent: shared-memory metrics plane + RDMA control API")]
pub struct Cli {
    /// API bind host.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// API bind port.
    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Page size in bytes; must evenly divide `mr_size`.
    #[arg(long)]
    pub page_size: Option<usize>,

    /// RDMA memory region size in bytes; a multiple of `page_size`.
    #[arg(long)]
    pub mr_size: Option<usize>,

    /// Total shared-memory pool size in bytes.
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Shared-memory segment name.
    #[arg(long, default_value = "/microview")]
    pub shm_name: String,

    /// RDMA device name (e.g. "mlx5_0"). Ignored if `--rdma-queues 0`.
    #[arg(long)]
    pub rdma_device: Option<String>,

    /// IB port number.
    #[arg(long)]
    pub ib_port: Option<u8>,

    /// GID index.
    #[arg(long)]
    pub gid_index: Option<u8>,

    /// Number of RDMA queue pairs to create; 0 disables the RDMA control routes.
    #[arg(long, default_value_t = 1)]
    pub rdma_queues: usize,

    /// Optional path to dump the MR/QP layout as JSON on startup, for debugging.
    #[arg(long)]
    pub dump_layout: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Resolved runtime configuration: CLI flags with environment fallbacks
/// applied for anything left at its clap default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub page_size: usize,
    pub mr_size: usize,
    pub pool_size: usize,
    pub shm_name: String,
    pub rdma_device: String,
    pub ib_port: u8,
    pub gid_index: u8,
    pub rdma_queues: usize,
    pub dump_layout: Option<String>,
}

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_RDMA_DEVICE: &str = "mlx5_1";
pub const DEFAULT_IB_PORT: u8 = 1;
pub const DEFAULT_GID_INDEX: u8 = 3;

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        let page_size = cli.page_size.unwrap_or_else(|| env_or("DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE));
        let mr_size = cli.mr_size.unwrap_or_else(|| env_or("DEFAULT_RDMA_MR_SIZE", page_size));
        let pool_size = cli.pool_size.unwrap_or_else(|| env_or("SHM_POOL_SIZE", 10 * mr_size));
        Config {
            host: cli.host,
            port: cli.port,
            page_size,
            mr_size,
            pool_size,
            shm_name: cli.shm_name,
            rdma_device: cli.rdma_device.unwrap_or_else(|| env_or("RDMA_DEVICE", DEFAULT_RDMA_DEVICE.to_string())),
            ib_port: cli.ib_port.unwrap_or_else(|| env_or("IB_PORT", DEFAULT_IB_PORT)),
            gid_index: cli.gid_index.unwrap_or_else(|| env_or("GID", DEFAULT_GID_INDEX)),
            rdma_queues: cli.rdma_queues,
            dump_layout: cli.dump_layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn explicit_mr_size_defaults_to_page_size_when_unset() {
        let cli = Cli::parse_from(["host-agent", "--page-size", "128"]);
        let cfg: Config = cli.into();
        assert_eq!(cfg.mr_size, 128);
        assert_eq!(cfg.pool_size, 10 * 128);
    }

    #[test]
    fn explicit_values_are_respected() {
        let cli = Cli::parse_from(["host-agent", "--page-size", "64", "--mr-size", "256", "--pool-size", "1024"]);
        let cfg: Config = cli.into();
        assert_eq!(cfg.page_size, 64);
        assert_eq!(cfg.mr_size, 256);
        assert_eq!(cfg.pool_size, 1024);
    }
}
