use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::{HarnessError, Result};

/// Completed output of a bounded external command invocation.
///
/// The buffers are immutable once the invocation completes and carry the
/// captured text verbatim, apart from a single trailing newline.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

/// Runs external commands with a wall-clock timeout and full output capture.
///
/// Exactly one timeout is armed per invocation. On expiry the child receives
/// SIGKILL and the call fails with `InvocationTimeout`; partial output is
/// never reported as success. A non-zero exit is a distinct failure kind
/// carrying the captured stderr.
pub struct CommandInvoker {
    timeout: Duration,
}

impl CommandInvoker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn invoke(&self, program: &str, args: &[&str]) -> Result<Invocation> {
        debug!(program, ?args, "invoking external command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Drain both pipes concurrently with the wait so a chatty child can
        // never deadlock on a full pipe buffer. Each accumulator is owned by
        // exactly one task and consumed once, after the child is done.
        let stdout_task = tokio::spawn(drain_stdout(child.stdout.take()));
        let stderr_task = tokio::spawn(drain_stderr(child.stderr.take()));

        let status = match timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(program, timeout = ?self.timeout, "command timed out, killing");
                // kill() sends SIGKILL and reaps the child; the drain tasks
                // then see EOF and finish on their own.
                if let Err(e) = child.kill().await {
                    warn!(program, error = %e, "failed to kill timed-out command");
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(HarnessError::InvocationTimeout {
                    program: program.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let stdout = trim_trailing_newline(stdout_task.await.unwrap_or_default());
        let stderr = trim_trailing_newline(stderr_task.await.unwrap_or_default());

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            return Err(HarnessError::CommandFailed {
                program: program.to_string(),
                code,
                stderr,
            });
        }

        Ok(Invocation {
            stdout,
            stderr,
            code: status.code().unwrap_or(0),
        })
    }
}

async fn drain_stdout(pipe: Option<ChildStdout>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf).await;
    }
    buf
}

async fn drain_stderr(pipe: Option<ChildStderr>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf).await;
    }
    buf
}

fn trim_trailing_newline(mut s: String) -> String {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    s
}
