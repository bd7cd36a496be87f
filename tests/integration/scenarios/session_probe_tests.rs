//! Probe suite scenarios over a real TCP session.

use std::time::Duration;

use kvprobe::connection::ConnectionManager;
use kvprobe::probes::run_session_probes;
use kvprobe::resp::{Reply, RespClient};

use crate::integration::infrastructure::FakeKvServer;

async fn connected_session(server: &FakeKvServer) -> ConnectionManager<RespClient> {
    let mut session = ConnectionManager::new(RespClient::new());
    session
        .connect(server.addr, Duration::from_secs(2))
        .await
        .expect("connect to fake server");
    session
}

#[tokio::test]
async fn full_session_suite_passes_over_tcp() -> anyhow::Result<()> {
    let server = FakeKvServer::start().await;
    let mut session = connected_session(&server).await;

    let results = run_session_probes(&mut session).await;

    assert_eq!(results.len(), 5);
    for result in &results {
        assert!(
            result.passed,
            "{} failed: {:?}",
            result.name, result.detail
        );
    }

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn px_key_expires_on_the_wire() -> anyhow::Result<()> {
    let server = FakeKvServer::start().await;
    let mut session = connected_session(&server).await;

    let set = session
        .request("SET", &["px_key", "ephemeral", "PX", "300"])
        .await?;
    assert_eq!(set, Reply::Simple("OK".into()));

    let fresh = session.request("GET", &["px_key"]).await?;
    assert_eq!(fresh, Reply::Bulk("ephemeral".into()));

    // 20% margin over the TTL.
    tokio::time::sleep(Duration::from_millis(360)).await;

    let stale = session.request("GET", &["px_key"]).await?;
    assert_eq!(stale, Reply::Nil);

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn absent_key_is_nil_not_empty_string() -> anyhow::Result<()> {
    let server = FakeKvServer::start().await;
    let mut session = connected_session(&server).await;

    let got = session.request("GET", &["never_written"]).await?;
    assert!(got.is_nil());
    assert_ne!(got, Reply::Bulk(String::new()));

    // An empty value stored explicitly reads back as an empty bulk string.
    session.request("SET", &["empty_key", ""]).await?;
    let empty = session.request("GET", &["empty_key"]).await?;
    assert_eq!(empty, Reply::Bulk(String::new()));

    session.close().await;
    Ok(())
}

#[tokio::test]
async fn close_after_server_disappears_does_not_fail() -> anyhow::Result<()> {
    let server = FakeKvServer::start().await;
    let mut session = connected_session(&server).await;

    // Kill the server while the session is live; close must still succeed
    // by falling back to a hard disconnect.
    drop(server);
    tokio::time::sleep(Duration::from_millis(100)).await;

    session.close().await;
    Ok(())
}
