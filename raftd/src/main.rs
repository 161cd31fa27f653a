//! `raftd` entry point: parse flags, open the node, serve until ctrl-c.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use raftd::{cli::Cli, node::Node};

fn init_tracing(default_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    let config = cli.node_config();
    let node = Node::open(config)
        .await
        .context("failed to open node")?;
    let origin = node.bootstrap().await.context("failed to bootstrap")?;

    let port = node.identity().port;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(node = %node.name(), %origin, "serving");

    if let Err(err) = node.run_until_ctrl_c(listener).await {
        warn!("server exited with error: {err:?}");
        return Err(err.into());
    }
    Ok(())
}
