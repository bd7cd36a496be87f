use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info};

use crate::connection::ConnectionManager;
use crate::errors::Result;
use crate::probes::{run_session_probes, CliProbes, ProbeResult};
use crate::resp::RespClient;
use crate::server::{ServerConfig, ServerProcess};

/// Everything one harness run needs to know.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub server_binary: PathBuf,
    pub server_args: Vec<String>,
    pub host: IpAddr,
    pub port: u16,
    pub ready_timeout: Duration,
    pub connect_timeout: Duration,
    /// External command-line client; CLI probes are skipped when unset.
    pub cli_client: Option<String>,
    pub cli_timeout: Duration,
    pub graceful_timeout: Duration,
}

/// Aggregated outcome of a run: the ordered probe results and their
/// logical-AND reduction.
#[derive(Debug)]
pub struct RunReport {
    pub results: Vec<ProbeResult>,
    pub passed: bool,
}

impl RunReport {
    fn new(results: Vec<ProbeResult>) -> Self {
        let passed = results.iter().all(|r| r.passed);
        Self { results, passed }
    }
}

/// Sequences one full run: spawn server, wait for readiness, open the client
/// session, run the probe suite, close the session, stop the server.
///
/// Fatal errors (launch, readiness, connect) abort the suite but always
/// force cleanup first; probe failures are recorded and never interrupt the
/// remaining probes. Teardown is never concurrent with an in-flight probe.
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<RunReport> {
        let addr = SocketAddr::new(self.config.host, self.config.port);
        let mut server = ServerProcess::new(ServerConfig {
            binary: self.config.server_binary.clone(),
            args: self.config.server_args.clone(),
            graceful_timeout: self.config.graceful_timeout,
        });

        // A spawn failure leaves nothing to clean up; stop() would be a no-op.
        server.spawn()?;

        if let Err(e) = server.await_ready(addr, self.config.ready_timeout).await {
            error!(error = %e, "server never became ready");
            server.stop().await;
            return Err(e);
        }

        let mut session = ConnectionManager::new(RespClient::new());
        if let Err(e) = session.connect(addr, self.config.connect_timeout).await {
            error!(error = %e, "client connect failed");
            server.stop().await;
            return Err(e);
        }

        info!("running probe suite");
        let mut results = run_session_probes(&mut session).await;

        if let Some(cli) = &self.config.cli_client {
            let cli_probes = CliProbes::new(cli.clone(), self.config.port, self.config.cli_timeout);
            results.extend(cli_probes.run_all().await);
        } else {
            info!("no CLI client configured, skipping CLI probes");
        }

        session.close().await;
        server.stop().await;

        Ok(RunReport::new(results))
    }
}
