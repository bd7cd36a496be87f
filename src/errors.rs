use std::time::Duration;

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Failure taxonomy for a harness run.
///
/// `Launch`, `ReadinessTimeout` and `ConnectFailure` are fatal: they abort
/// the remaining probes (after cleanup). The rest are probe-local: the suite
/// records them as a failing result and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The server binary could not be spawned at all.
    #[error("failed to launch server binary {path}: {source}")]
    Launch {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The server never accepted a TCP connection within the deadline.
    #[error("server did not accept connections on {addr} within {timeout:?} ({attempts} attempts)")]
    ReadinessTimeout {
        addr: String,
        timeout: Duration,
        attempts: u32,
    },

    /// The client capability failed to establish a session.
    #[error("client failed to connect to {addr}: {reason}")]
    ConnectFailure { addr: String, reason: String },

    /// An external command exceeded its wall-clock budget and was killed.
    #[error("command `{program}` timed out after {timeout:?}")]
    InvocationTimeout { program: String, timeout: Duration },

    /// An external command exited non-zero; stderr is kept for diagnosis.
    #[error("command `{program}` exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// The service answered with an error reply or an unexpected reply shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A request was issued while the session was not in the Connected state.
    #[error("no connected session (state: {state})")]
    NotConnected { state: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Fatal errors abort the run; everything else is recorded per-probe.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Launch { .. }
                | HarnessError::ReadinessTimeout { .. }
                | HarnessError::ConnectFailure { .. }
        )
    }
}
