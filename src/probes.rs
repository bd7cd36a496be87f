use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use crate::connection::{ClientCapability, ConnectionManager};
use crate::errors::{HarnessError, Result};
use crate::invoker::CommandInvoker;
use crate::resp::Reply;

/// TTL used by the expiring-key probe.
const PX_TTL: Duration = Duration::from_millis(1000);

/// Wait before the post-expiry read. Exceeds the TTL by a 20% margin to
/// absorb scheduling jitter on the server side.
const PX_EXPIRY_WAIT: Duration = Duration::from_millis(1200);

/// Outcome of one functional check.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: Option<String>,
}

impl ProbeResult {
    fn pass(name: &'static str) -> Self {
        Self {
            name,
            passed: true,
            detail: None,
        }
    }

    fn fail(name: &'static str, detail: String) -> Self {
        Self {
            name,
            passed: false,
            detail: Some(detail),
        }
    }
}

/// Runs one probe, converting any error into a failing result so a broken
/// check never prevents the rest of the suite from running and reporting.
async fn check<F>(name: &'static str, probe: F) -> ProbeResult
where
    F: Future<Output = Result<()>>,
{
    let result = match probe.await {
        Ok(()) => ProbeResult::pass(name),
        Err(e) => ProbeResult::fail(name, e.to_string()),
    };
    info!(
        probe = name,
        passed = result.passed,
        detail = result.detail.as_deref().unwrap_or(""),
        "probe finished"
    );
    result
}

fn assert_reply(context: &str, got: Reply, want: Reply) -> Result<()> {
    if got == want {
        Ok(())
    } else {
        Err(HarnessError::Protocol(format!(
            "{context}: expected {want:?}, got {got:?}"
        )))
    }
}

/// Functional checks driven over the persistent client session.
///
/// Probes run strictly one at a time; requests are never pipelined, which
/// keeps protocol framing unambiguous on the shared connection.
pub async fn run_session_probes<C: ClientCapability>(
    session: &mut ConnectionManager<C>,
) -> Vec<ProbeResult> {
    vec![
        check("session set-get round trip", round_trip(session)).await,
        check("session missing key is nil", missing_key(session)).await,
        check("session px expiry", expiring_key(session)).await,
        check("session ping liveness", liveness(session)).await,
        check("session echo", echo(session)).await,
    ]
}

async fn round_trip<C: ClientCapability>(session: &mut ConnectionManager<C>) -> Result<()> {
    let set = session.request("SET", &["testkey", "testvalue"]).await?;
    assert_reply("SET", set, Reply::Simple("OK".into()))?;

    let get = session.request("GET", &["testkey"]).await?;
    assert_reply("GET", get, Reply::Bulk("testvalue".into()))
}

async fn missing_key<C: ClientCapability>(session: &mut ConnectionManager<C>) -> Result<()> {
    let got = session.request("GET", &["nonexistent"]).await?;
    match got {
        Reply::Nil => Ok(()),
        Reply::Bulk(v) if v.is_empty() => Err(HarnessError::Protocol(
            "missing key returned empty string instead of nil".into(),
        )),
        other => Err(HarnessError::Protocol(format!(
            "missing key returned {other:?}"
        ))),
    }
}

async fn expiring_key<C: ClientCapability>(session: &mut ConnectionManager<C>) -> Result<()> {
    let ttl = PX_TTL.as_millis().to_string();
    let set = session
        .request("SET", &["testkey_px", "tempvalue", "PX", &ttl])
        .await?;
    assert_reply("SET PX", set, Reply::Simple("OK".into()))?;

    // The immediate read happens with no added delay, to catch a server
    // that expires keys prematurely.
    let fresh = session.request("GET", &["testkey_px"]).await?;
    assert_reply("GET before expiry", fresh, Reply::Bulk("tempvalue".into()))?;

    sleep(PX_EXPIRY_WAIT).await;

    let stale = session.request("GET", &["testkey_px"]).await?;
    assert_reply("GET after expiry", stale, Reply::Nil)
}

async fn liveness<C: ClientCapability>(session: &mut ConnectionManager<C>) -> Result<()> {
    let pong = session.request("PING", &[]).await?;
    assert_reply("PING", pong, Reply::Simple("PONG".into()))
}

async fn echo<C: ClientCapability>(session: &mut ConnectionManager<C>) -> Result<()> {
    let payload = "hello-world";
    let got = session.request("ECHO", &[payload]).await?;
    match got {
        Reply::Bulk(v) if v == payload => Ok(()),
        Reply::Simple(v) if v == payload => Ok(()),
        other => Err(HarnessError::Protocol(format!(
            "ECHO returned {other:?}, expected {payload:?}"
        ))),
    }
}

/// Functional checks driven through the external command-line client, one
/// process invocation per command.
pub struct CliProbes {
    invoker: CommandInvoker,
    program: String,
    port: u16,
}

impl CliProbes {
    pub fn new(program: String, port: u16, timeout: Duration) -> Self {
        Self {
            invoker: CommandInvoker::new(timeout),
            program,
            port,
        }
    }

    pub async fn run_all(&self) -> Vec<ProbeResult> {
        vec![
            check("cli set-get round trip", self.round_trip()).await,
            check("cli missing key is nil", self.missing_key()).await,
            check("cli overwrite", self.overwrite()).await,
            check("cli multiple keys", self.multiple_keys()).await,
            check("cli ping and echo", self.ping_echo()).await,
            check("cli arity errors", self.arity_errors()).await,
        ]
    }

    /// One client invocation: `<program> -p <port> COMMAND operands...`,
    /// stdout is the reply.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let port = self.port.to_string();
        let mut argv = vec!["-p", port.as_str()];
        argv.extend_from_slice(args);
        let invocation = self.invoker.invoke(&self.program, &argv).await?;
        Ok(invocation.stdout)
    }

    /// The CLI prints `(nil)` (or nothing) for an absent value.
    fn is_nil_token(reply: &str) -> bool {
        reply == "(nil)" || reply.is_empty()
    }

    fn expect(context: &str, got: &str, want: &str) -> Result<()> {
        if got == want {
            Ok(())
        } else {
            Err(HarnessError::Protocol(format!(
                "{context}: expected {want:?}, got {got:?}"
            )))
        }
    }

    async fn round_trip(&self) -> Result<()> {
        self.run(&["SET", "test_key", "test_value"]).await?;
        let got = self.run(&["GET", "test_key"]).await?;
        Self::expect("cli GET", &got, "test_value")
    }

    async fn missing_key(&self) -> Result<()> {
        let got = self.run(&["GET", "nonexistent_key"]).await?;
        if Self::is_nil_token(&got) {
            Ok(())
        } else {
            Err(HarnessError::Protocol(format!(
                "cli GET of missing key returned {got:?}"
            )))
        }
    }

    async fn overwrite(&self) -> Result<()> {
        self.run(&["SET", "overwrite_key", "value1"]).await?;
        self.run(&["SET", "overwrite_key", "value2"]).await?;
        let got = self.run(&["GET", "overwrite_key"]).await?;
        Self::expect("cli GET after overwrite", &got, "value2")
    }

    async fn multiple_keys(&self) -> Result<()> {
        for (k, v) in [("key1", "value1"), ("key2", "value2"), ("key3", "value3")] {
            self.run(&["SET", k, v]).await?;
        }
        for (k, v) in [("key1", "value1"), ("key2", "value2"), ("key3", "value3")] {
            let got = self.run(&["GET", k]).await?;
            Self::expect(k, &got, v)?;
        }
        Ok(())
    }

    async fn ping_echo(&self) -> Result<()> {
        let pong = self.run(&["PING"]).await?;
        Self::expect("cli PING", &pong, "PONG")?;

        let msg = "hello-redis-cli";
        let echoed = self.run(&["ECHO", msg]).await?;
        Self::expect("cli ECHO", &echoed, msg)
    }

    /// Commands with missing operands must be rejected, either by a non-zero
    /// exit or an error reply on stdout.
    async fn arity_errors(&self) -> Result<()> {
        for args in [&["GET"][..], &["SET", "test_key"][..]] {
            match self.run(args).await {
                Err(_) => {}
                Ok(out) if looks_like_error(&out) => {}
                Ok(out) => {
                    return Err(HarnessError::Protocol(format!(
                        "{args:?} should have been rejected, got {out:?}"
                    )))
                }
            }
        }
        Ok(())
    }
}

fn looks_like_error(reply: &str) -> bool {
    reply.starts_with("ERR")
        || reply.starts_with("(error)")
        || reply.contains("wrong number of arguments")
}
