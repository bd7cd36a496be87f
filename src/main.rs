use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kvprobe::cli::Cli;
use kvprobe::harness::Harness;

type Result<T> = color_eyre::eyre::Result<T>;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Cli::parse().into_config()?;
    info!(server = %config.server_binary.display(), port = config.port, "kvprobe starting");

    let report = Harness::new(config).run().await?;

    for result in &report.results {
        println!("{}", render_result(result));
    }
    println!(
        "{}/{} probes passed",
        report.results.iter().filter(|r| r.passed).count(),
        report.results.len()
    );

    if !report.passed {
        std::process::exit(1);
    }
    Ok(())
}

fn render_result(result: &kvprobe::probes::ProbeResult) -> String {
    let status = if result.passed { "PASS" } else { "FAIL" };
    match &result.detail {
        Some(detail) => format!("{status}  {}: {detail}", result.name),
        None => format!("{status}  {}", result.name),
    }
}
