use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::errors::{HarnessError, Result};
use crate::readiness::{ReadinessPoller, ReadinessReport};

/// Settle delay after a confirmed exit, so OS-level resources (the listening
/// socket in particular) are released before the caller proceeds.
const POST_EXIT_SETTLE: Duration = Duration::from_millis(50);

/// Configuration for the supervised server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the pre-built server binary.
    pub binary: PathBuf,
    /// Arguments for the binary (the server under test needs none).
    pub args: Vec<String>,
    /// How long to wait after SIGTERM before escalating to SIGKILL.
    pub graceful_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("build/server"),
            args: Vec::new(),
            graceful_timeout: Duration::from_secs(5),
        }
    }
}

/// Lifecycle state of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Spawns and supervises the server binary under test.
///
/// The controller is the exclusive owner of the child handle and the only
/// component that sends it termination signals. Server stdout/stderr are
/// forwarded to the log as diagnostics; they never constitute a failure by
/// themselves.
pub struct ServerProcess {
    config: ServerConfig,
    state: ServerState,
    pid: Option<Pid>,
    child: Option<Child>,
    output_forwarders: Vec<JoinHandle<()>>,
}

impl ServerProcess {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: ServerState::Stopped,
            pid: None,
            child: None,
            output_forwarders: Vec::new(),
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }

    /// Spawns the server binary with piped stdio.
    ///
    /// A spawn error (binary missing, not executable) is fatal for the run;
    /// there is no retry.
    pub fn spawn(&mut self) -> Result<()> {
        self.state = ServerState::Starting;
        info!(binary = %self.config.binary.display(), "spawning server");

        let spawned = Command::new(&self.config.binary)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.state = ServerState::Failed;
                return Err(HarnessError::Launch {
                    path: self.config.binary.display().to_string(),
                    source: e,
                });
            }
        };

        if let Some(stdout) = child.stdout.take() {
            self.output_forwarders
                .push(forward_output(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            self.output_forwarders
                .push(forward_output(stderr, "stderr"));
        }

        self.pid = child.id().map(|id| Pid::from_raw(id as i32));
        self.child = Some(child);
        self.state = ServerState::Running;
        info!(pid = ?self.pid, "server spawned");
        Ok(())
    }

    /// Polls the given address until the server accepts TCP connections.
    /// A timeout here is fatal, but the caller must still run `stop()`
    /// before surfacing it.
    pub async fn await_ready(&self, addr: SocketAddr, limit: Duration) -> Result<ReadinessReport> {
        let report = ReadinessPoller::new(addr).poll(limit).await;
        if report.is_ready() {
            info!(%addr, elapsed = ?report.elapsed, attempts = report.attempts, "server ready");
            Ok(report)
        } else {
            Err(HarnessError::ReadinessTimeout {
                addr: addr.to_string(),
                timeout: limit,
                attempts: report.attempts,
            })
        }
    }

    /// Stops the server: SIGTERM, then SIGKILL if it has not exited within
    /// the graceful timeout. Idempotent, infallible, and safe to call even
    /// if `spawn()` never completed.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            self.detach_forwarders();
            return;
        };

        self.state = ServerState::Stopping;

        if let Some(pid) = self.pid {
            debug!(%pid, "sending SIGTERM");
            if let Err(e) = kill(pid, Signal::SIGTERM) {
                // ESRCH means the process already exited; anything else is
                // still not fatal, the escalation below covers it.
                if e != nix::errno::Errno::ESRCH {
                    warn!(%pid, error = %e, "failed to send SIGTERM");
                }
            }
        }

        match timeout(self.config.graceful_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!(?status, "server exited gracefully");
                self.state = ServerState::Stopped;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "error waiting for server exit, force killing");
                force_kill(&mut child).await;
                self.state = ServerState::Stopped;
            }
            Err(_) => {
                warn!(timeout = ?self.config.graceful_timeout, "graceful shutdown timed out, force killing");
                force_kill(&mut child).await;
                self.state = ServerState::Stopped;
            }
        }

        self.detach_forwarders();
        self.pid = None;
        sleep(POST_EXIT_SETTLE).await;
    }

    fn detach_forwarders(&mut self) {
        for task in self.output_forwarders.drain(..) {
            task.abort();
        }
    }
}

async fn force_kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill server process");
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        // Emergency cleanup when the controller is dropped with a live
        // child, for instance when a test panics before teardown.
        if self.child.is_some() {
            if let Some(pid) = self.pid {
                warn!(%pid, "server process still alive on drop, sending SIGKILL");
                match kill(pid, Signal::SIGKILL) {
                    Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                    Err(e) => warn!(%pid, error = %e, "emergency SIGKILL failed"),
                }
            }
        }
        self.detach_forwarders();
        // kill_on_drop on the tokio Child covers the remaining window.
    }
}

fn forward_output<R>(pipe: R, label: &'static str) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(stream = label, "server: {line}");
        }
    })
}
