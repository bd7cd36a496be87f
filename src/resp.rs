use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use crate::connection::ClientCapability;
use crate::errors::{HarnessError, Result};

/// A single reply from the key-value service.
///
/// `Nil` is a distinct variant rather than an empty `Bulk`: the protocol
/// distinguishes "key absent" (`$-1`) from "empty value" (`$0`), and the
/// probes rely on that distinction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(String),
    Nil,
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }
}

/// Minimal RESP2 client over a plain TCP stream.
///
/// Commands are encoded as arrays of bulk strings; replies cover the types a
/// key-value server produces for single commands (simple string, error,
/// integer, bulk string, nil). Array replies are out of scope for this
/// harness and are rejected as protocol errors.
pub struct RespClient {
    stream: Option<TcpStream>,
    /// Bytes read from the socket but not yet consumed by a parsed reply.
    buf: Vec<u8>,
}

impl RespClient {
    pub fn new() -> Self {
        Self {
            stream: None,
            buf: Vec::new(),
        }
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some((reply, consumed)) = parse_reply(&self.buf)? {
                self.buf.drain(..consumed);
                return Ok(reply);
            }

            let stream = self
                .stream
                .as_mut()
                .ok_or(HarnessError::NotConnected { state: "closed" })?;

            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(HarnessError::Protocol(
                    "connection closed mid-reply".to_string(),
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

impl Default for RespClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientCapability for RespClient {
    async fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| HarnessError::ConnectFailure {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn request(&mut self, command: &str, args: &[&str]) -> Result<Reply> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(HarnessError::NotConnected { state: "closed" })?;

        let frame = encode_command(command, args);
        trace!(command, ?args, "sending request");
        stream.write_all(&frame).await?;

        let reply = self.read_reply().await?;
        trace!(command, ?reply, "received reply");
        Ok(reply)
    }

    async fn quit(&mut self) -> Result<()> {
        // Best-effort graceful exchange; the server replies +OK and closes.
        let reply = self.request("QUIT", &[]).await?;
        match reply {
            Reply::Simple(_) => {
                self.disconnect().await;
                Ok(())
            }
            other => Err(HarnessError::Protocol(format!(
                "unexpected QUIT reply: {other:?}"
            ))),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.buf.clear();
    }
}

/// Encodes `command args...` as a RESP array of bulk strings.
pub fn encode_command(command: &str, args: &[&str]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    out.extend_from_slice(format!("*{}\r\n", args.len() + 1).as_bytes());
    for part in std::iter::once(command).chain(args.iter().copied()) {
        out.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Tries to parse one complete reply from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, or the reply plus the
/// number of bytes consumed.
fn parse_reply(buf: &[u8]) -> Result<Option<(Reply, usize)>> {
    let Some(line_end) = find_crlf(buf) else {
        return Ok(None);
    };
    let line = std::str::from_utf8(&buf[1..line_end])
        .map_err(|e| HarnessError::Protocol(format!("non-utf8 reply: {e}")))?;
    let after_line = line_end + 2;

    match buf[0] {
        b'+' => Ok(Some((Reply::Simple(line.to_string()), after_line))),
        b'-' => Ok(Some((Reply::Error(line.to_string()), after_line))),
        b':' => {
            let n = line
                .parse::<i64>()
                .map_err(|_| HarnessError::Protocol(format!("bad integer reply: {line}")))?;
            Ok(Some((Reply::Integer(n), after_line)))
        }
        b'$' => {
            let len = line
                .parse::<i64>()
                .map_err(|_| HarnessError::Protocol(format!("bad bulk length: {line}")))?;
            if len < 0 {
                return Ok(Some((Reply::Nil, after_line)));
            }
            let len = len as usize;
            let total = after_line + len + 2;
            if buf.len() < total {
                return Ok(None);
            }
            let payload = std::str::from_utf8(&buf[after_line..after_line + len])
                .map_err(|e| HarnessError::Protocol(format!("non-utf8 bulk reply: {e}")))?;
            Ok(Some((Reply::Bulk(payload.to_string()), total)))
        }
        other => Err(HarnessError::Protocol(format!(
            "unsupported reply type byte: {:?}",
            other as char
        ))),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
