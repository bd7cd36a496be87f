//! CLI probe path scenarios.
//!
//! The external client is exercised through a stub script with redis-cli's
//! argv shape (`-p PORT COMMAND operands...`) and reply conventions: values
//! on stdout, `(nil)` for absent keys, errors on stderr with a non-zero
//! exit. A file-backed store gives SET/GET real semantics.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kvprobe::harness::{Harness, HarnessConfig};
use kvprobe::probes::CliProbes;

use crate::integration::infrastructure::FakeKvServer;

const STUB_CLI: &str = r#"#!/bin/sh
store="STORE_DIR"
[ "$1" = "-p" ] || { echo "ERR expected -p PORT" >&2; exit 2; }
shift 2
cmd="$1"
shift
case "$cmd" in
PING)
    echo PONG
    ;;
ECHO)
    [ $# -eq 1 ] || { echo "ERR wrong number of arguments for 'echo' command" >&2; exit 1; }
    echo "$1"
    ;;
SET)
    [ $# -eq 2 ] || { echo "ERR wrong number of arguments for 'set' command" >&2; exit 1; }
    printf '%s' "$2" > "$store/$1"
    echo OK
    ;;
GET)
    [ $# -eq 1 ] || { echo "ERR wrong number of arguments for 'get' command" >&2; exit 1; }
    if [ -f "$store/$1" ]; then
        cat "$store/$1"
        echo
    else
        echo "(nil)"
    fi
    ;;
*)
    echo "ERR unknown command '$cmd'" >&2
    exit 1
    ;;
esac
"#;

fn write_stub_cli(dir: &Path) -> PathBuf {
    let store = dir.join("store");
    std::fs::create_dir(&store).expect("create stub store dir");

    let script = dir.join("cli");
    let body = STUB_CLI.replace("STORE_DIR", store.to_str().unwrap());
    std::fs::write(&script, body).expect("write stub cli");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .expect("chmod stub cli");
    script
}

#[tokio::test]
async fn cli_suite_passes_against_stub_client() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_stub_cli(dir.path());

    let probes = CliProbes::new(
        script.to_str().unwrap().to_string(),
        6379,
        Duration::from_secs(5),
    );
    let results = probes.run_all().await;

    assert_eq!(results.len(), 6);
    for result in &results {
        assert!(
            result.passed,
            "{} failed: {:?}",
            result.name, result.detail
        );
    }
    Ok(())
}

#[tokio::test]
async fn cli_suite_completes_when_client_is_missing() -> anyhow::Result<()> {
    let probes = CliProbes::new(
        "/nonexistent/cli-client".to_string(),
        6379,
        Duration::from_secs(1),
    );
    let results = probes.run_all().await;

    // Every probe reports; a broken client never aborts the suite.
    assert_eq!(results.len(), 6);
    assert_eq!(results.last().unwrap().name, "cli arity errors");

    let round_trip = results
        .iter()
        .find(|r| r.name == "cli set-get round trip")
        .unwrap();
    assert!(!round_trip.passed);
    Ok(())
}

#[tokio::test]
async fn full_run_includes_cli_probes_when_configured() -> anyhow::Result<()> {
    let server = FakeKvServer::start().await;
    let dir = tempfile::tempdir()?;
    let script = write_stub_cli(dir.path());

    let config = HarnessConfig {
        server_binary: PathBuf::from("sleep"),
        server_args: vec!["30".into()],
        host: "127.0.0.1".parse().unwrap(),
        port: server.addr.port(),
        ready_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        cli_client: Some(script.to_str().unwrap().to_string()),
        cli_timeout: Duration::from_secs(5),
        graceful_timeout: Duration::from_secs(2),
    };

    let report = Harness::new(config).run().await?;

    // 5 session probes + 6 CLI probes.
    assert_eq!(report.results.len(), 11);
    assert!(report.passed, "failed probes: {:?}", report.results);
    Ok(())
}
