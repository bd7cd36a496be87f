//! Full-run orchestration scenarios.
//!
//! The harness only needs a spawnable binary and a listening port; these
//! scenarios pair an inert child process (or a throwaway shell script) with
//! the in-process fake server so a complete run can be exercised without the
//! real server binary.

use std::net::IpAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use kvprobe::errors::HarnessError;
use kvprobe::harness::{Harness, HarnessConfig};

use crate::integration::infrastructure::FakeKvServer;

fn config(binary: &str, args: &[&str], port: u16) -> HarnessConfig {
    HarnessConfig {
        server_binary: PathBuf::from(binary),
        server_args: args.iter().map(|s| s.to_string()).collect(),
        host: "127.0.0.1".parse::<IpAddr>().unwrap(),
        port,
        ready_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        cli_client: None,
        cli_timeout: Duration::from_secs(5),
        graceful_timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn full_run_reports_all_probes_passing() -> anyhow::Result<()> {
    let server = FakeKvServer::start().await;

    let harness = Harness::new(config("sleep", &["30"], server.addr.port()));
    let report = harness.run().await?;

    assert!(report.passed, "failed probes: {:?}", report.results);
    assert_eq!(report.results.len(), 5);
    Ok(())
}

#[tokio::test]
async fn full_run_with_script_server_binary() -> anyhow::Result<()> {
    let server = FakeKvServer::start().await;

    // A stand-in server binary the way the real one would be launched: an
    // executable file path, no arguments.
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("server");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n")?;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

    let harness = Harness::new(config(
        script.to_str().unwrap(),
        &[],
        server.addr.port(),
    ));
    let report = harness.run().await?;

    assert!(report.passed, "failed probes: {:?}", report.results);
    Ok(())
}

#[tokio::test]
async fn non_executable_binary_is_a_launch_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("server");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n")?;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644))?;

    let harness = Harness::new(config(script.to_str().unwrap(), &[], 6399));
    let err = harness.run().await.unwrap_err();

    assert!(matches!(err, HarnessError::Launch { .. }));
    Ok(())
}

#[tokio::test]
async fn unready_server_times_out_and_is_torn_down() -> anyhow::Result<()> {
    // Child starts fine but never listens; poll a port nothing serves.
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let dead_port = probe.local_addr()?.port();
    drop(probe);

    let mut cfg = config("sleep", &["30"], dead_port);
    cfg.ready_timeout = Duration::from_millis(600);

    let harness = Harness::new(cfg);
    let start = std::time::Instant::now();
    let err = harness.run().await.unwrap_err();

    assert!(matches!(err, HarnessError::ReadinessTimeout { .. }));
    // Teardown happened promptly instead of waiting out the 30 s child.
    assert!(start.elapsed() < Duration::from_secs(10));
    Ok(())
}
