use clap::Parser;
use eyre::eyre;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::harness::HarnessConfig;

type Result<T> = color_eyre::eyre::Result<T>;

/// Black-box end-to-end test harness for a RESP key-value server
#[derive(Parser)]
#[command(name = "kvprobe")]
#[command(about = "Launches a key-value server binary and probes it over TCP")]
#[command(version)]
pub struct Cli {
    /// Path to the pre-built server binary
    #[arg(long, default_value = "build/server")]
    pub server: PathBuf,

    /// Extra arguments passed to the server binary
    #[arg(long = "server-arg")]
    pub server_args: Vec<String>,

    /// Address the server listens on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port the server listens on
    #[arg(long, default_value = "6379")]
    pub port: u16,

    /// Readiness poll deadline (ms)
    #[arg(long, default_value = "10000")]
    pub ready_timeout_ms: u64,

    /// Client connect deadline (ms)
    #[arg(long, default_value = "10000")]
    pub connect_timeout_ms: u64,

    /// External command-line client for the CLI probe path (e.g. redis-cli);
    /// CLI probes are skipped when not given
    #[arg(long)]
    pub cli_client: Option<String>,

    /// Per-invocation timeout for the CLI client (ms)
    #[arg(long, default_value = "5000")]
    pub cli_timeout_ms: u64,

    /// Graceful shutdown escalation timeout (seconds)
    #[arg(long, default_value = "5")]
    pub graceful_timeout_secs: u64,
}

impl Cli {
    /// Parse command line arguments into a harness configuration
    pub fn into_config(self) -> Result<HarnessConfig> {
        let host: IpAddr = self
            .host
            .parse()
            .map_err(|e| eyre!("Invalid host address '{}': {}", self.host, e))?;

        Ok(HarnessConfig {
            server_binary: self.server,
            server_args: self.server_args,
            host,
            port: self.port,
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            cli_client: self.cli_client,
            cli_timeout: Duration::from_millis(self.cli_timeout_ms),
            graceful_timeout: Duration::from_secs(self.graceful_timeout_secs),
        })
    }
}
