//! robocore gateway binary.

use anyhow::Context;
use clap::Parser;
use robo_server::{Cli, Coordinator, init_tracing, shutdown_signal};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format)?;

    let config = cli.coordinator_config();
    info!(
        bind = %config.gateway.bind_addr,
        max_connections = config.gateway.max_connections,
        "starting robocore gateway"
    );

    let running = Coordinator::local(config, cli.sensor_topics.clone())
        .start()
        .await
        .context("robocore failed to start")?;

    let addr = running.gateway_addr();
    info!("  HTTP API:   http://{addr}/api/v1");
    info!("  WebSocket:  ws://{addr}/api/v1/ws");

    let report = running.run_until(shutdown_signal()).await;
    if report.is_clean() {
        info!(elapsed = ?report.elapsed, "robocore stopped");
    } else {
        warn!(?report, "robocore stopped with forced cleanup");
    }
    Ok(())
}
