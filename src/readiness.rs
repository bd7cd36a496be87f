use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};

/// Delay after a successful probe connection before declaring Ready.
/// The server may accept connections slightly before it is fully initialized.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Backoff between failed connection attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(150);

/// Outcome of a readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Result of polling a TCP endpoint until it accepts connections.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessReport {
    pub outcome: Readiness,
    pub elapsed: Duration,
    pub attempts: u32,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.outcome == Readiness::Ready
    }
}

/// Polls a host/port with raw TCP connections until the service accepts one
/// or the deadline elapses.
///
/// This is pure polling with no synchronization signal from the server
/// process itself; server log output is an unreliable, implementation
/// specific readiness indicator and is deliberately ignored.
pub struct ReadinessPoller {
    addr: SocketAddr,
}

impl ReadinessPoller {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Attempts connections until success or `limit` worth of elapsed time.
    /// Returns `TimedOut` as a value rather than an error; the caller decides
    /// whether that is fatal.
    ///
    /// Each attempt is capped by the remaining budget: a host that silently
    /// drops SYNs would otherwise stall a single connect for the OS retry
    /// window, far past the deadline.
    pub async fn poll(&self, limit: Duration) -> ReadinessReport {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let remaining = limit.saturating_sub(start.elapsed());
            match timeout(remaining, TcpStream::connect(self.addr)).await {
                Ok(Ok(stream)) => {
                    // The probe connection's only job is to prove the listener
                    // is up; drop it immediately.
                    drop(stream);
                    sleep(SETTLE_DELAY).await;
                    let elapsed = start.elapsed();
                    debug!(addr = %self.addr, ?elapsed, attempts, "service accepting connections");
                    return ReadinessReport {
                        outcome: Readiness::Ready,
                        elapsed,
                        attempts,
                    };
                }
                Ok(Err(e)) => {
                    trace!(addr = %self.addr, attempts, error = %e, "connection refused, retrying");
                    if start.elapsed() >= limit {
                        return ReadinessReport {
                            outcome: Readiness::TimedOut,
                            elapsed: start.elapsed(),
                            attempts,
                        };
                    }
                    sleep(RETRY_INTERVAL).await;
                }
                Err(_) => {
                    // The attempt consumed the rest of the budget.
                    return ReadinessReport {
                        outcome: Readiness::TimedOut,
                        elapsed: start.elapsed(),
                        attempts,
                    };
                }
            }
        }
    }
}
