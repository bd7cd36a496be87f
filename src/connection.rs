use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::{HarnessError, Result};
use crate::resp::Reply;

/// The protocol client the harness drives. The wire protocol itself is an
/// external concern; the harness only needs connect/request/close.
///
/// Some client implementations report connect success through the returned
/// future, others through an out-of-band notification; `connected_event`
/// exposes the latter path so the session manager can race both.
pub trait ClientCapability {
    fn connect(&mut self, addr: SocketAddr) -> impl Future<Output = Result<()>>;

    /// Out-of-band "connected" notification, if this client has one.
    fn connected_event(&mut self) -> Option<oneshot::Receiver<()>> {
        None
    }

    fn request(
        &mut self,
        command: &str,
        args: &[&str],
    ) -> impl Future<Output = Result<Reply>>;

    /// Graceful session end (QUIT exchange or equivalent).
    fn quit(&mut self) -> impl Future<Output = Result<()>>;

    /// Hard transport teardown. Must not fail.
    fn disconnect(&mut self) -> impl Future<Output = ()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        }
    }
}

/// Owns the single client session of a harness run.
///
/// At most one session is active at a time; no request is issued unless the
/// session is in the Connected state.
pub struct ConnectionManager<C: ClientCapability> {
    client: C,
    state: SessionState,
}

impl<C: ClientCapability> ConnectionManager<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Establishes the session, resolving exactly once no matter which of the
    /// client's success paths fires first. The whole attempt is bounded by
    /// `limit` in case the client signals neither path.
    pub async fn connect(&mut self, addr: SocketAddr, limit: Duration) -> Result<()> {
        self.state = SessionState::Connecting;

        let event = self.client.connected_event();
        let attempt = first_settled(self.client.connect(addr), event);

        match timeout(limit, attempt).await {
            Ok(Ok(())) => {
                self.state = SessionState::Connected;
                debug!(%addr, "session established");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = SessionState::Disconnected;
                Err(HarnessError::ConnectFailure {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                self.state = SessionState::Disconnected;
                Err(HarnessError::ConnectFailure {
                    addr: addr.to_string(),
                    reason: format!("no connect signal within {limit:?}"),
                })
            }
        }
    }

    /// Issues one request over the live session.
    pub async fn request(&mut self, command: &str, args: &[&str]) -> Result<Reply> {
        if self.state != SessionState::Connected {
            return Err(HarnessError::NotConnected {
                state: self.state.name(),
            });
        }
        self.client.request(command, args).await
    }

    /// Ends the session. Idempotent and infallible: close runs during
    /// cleanup, where the caller may already be handling an earlier error,
    /// so every failure on this path is swallowed.
    pub async fn close(&mut self) {
        if self.state != SessionState::Connected {
            self.state = SessionState::Closed;
            return;
        }

        if let Err(e) = self.client.quit().await {
            warn!(error = %e, "graceful quit failed, dropping transport");
            self.client.disconnect().await;
        }
        self.state = SessionState::Closed;
    }
}

/// Races a deferred connect result against an optional out-of-band success
/// event; whichever settles first wins and the loser is dropped. A closed
/// event channel falls back to the future so a missing notifier can never
/// wedge the connect.
async fn first_settled<F>(connect: F, event: Option<oneshot::Receiver<()>>) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match event {
        None => connect.await,
        Some(rx) => {
            tokio::pin!(connect);
            tokio::select! {
                res = &mut connect => res,
                ev = rx => match ev {
                    Ok(()) => Ok(()),
                    Err(_) => connect.await,
                },
            }
        }
    }
}
