#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use raftd::bootstrap::ClusterOrigin;
use raftd::config::NodeConfig;
use raftd::engine::ConsensusEngine;
use raftd::forward::ForwardPolicy;
use raftd::node::Node;
use raftd::protocol::LogEntry;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// A node served on an ephemeral loopback port.
pub struct TestNode {
    pub name: String,
    pub addr: SocketAddr,
    /// `None` for a node started without bootstrapping.
    pub origin: Option<ClusterOrigin>,
    pub engine: Arc<dyn ConsensusEngine>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

pub fn test_config(dir: &Path, port: u16, join: Option<String>) -> NodeConfig {
    NodeConfig {
        host: "127.0.0.1".into(),
        port,
        join,
        forward: ForwardPolicy {
            max_attempts: 200,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            deadline: Duration::from_secs(5),
        },
        rpc_timeout: Duration::from_secs(1),
        tick_interval: Duration::from_millis(25),
        ..NodeConfig::new(dir)
    }
}

impl TestNode {
    /// Binds first so the advertised port is known, then opens, bootstraps
    /// and serves the node.
    pub async fn start(dir: &Path, join: Option<&TestNode>) -> Result<Self> {
        Self::launch(dir, join, true).await
    }

    /// Serves a node that never bootstraps, so it stays a leaderless follower.
    pub async fn start_detached(dir: &Path) -> Result<Self> {
        Self::launch(dir, None, false).await
    }

    async fn launch(dir: &Path, join: Option<&TestNode>, bootstrap: bool) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let config = test_config(dir, addr.port(), join.map(|node| node.name.clone()));

        let node = Node::open(config).await?;
        let origin = if bootstrap {
            Some(node.bootstrap().await?)
        } else {
            None
        };
        let name = node.name().to_string();
        let engine = node.engine().clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            let _ = node.serve(listener, shutdown).await;
        });

        Ok(Self {
            name,
            addr,
            origin,
            engine,
            shutdown: Some(shutdown_tx),
            server: Some(server),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(server) = self.server.take() {
            server.await?;
        }
        drop(self);
        // The engine's worker exits on its next tick once the node is gone.
        sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}

pub async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

pub async fn get_log(client: &reqwest::Client, node: &TestNode) -> Result<Vec<LogEntry>> {
    let bytes = get_bytes(client, &node.url("/log")).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Polls `url` until it returns `expected` or five seconds pass.
pub async fn wait_for_body(client: &reqwest::Client, url: &str, expected: &[u8]) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let body = get_bytes(client, url).await?;
        if body == expected {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("{url} still answers {:?}", String::from_utf8_lossy(&body));
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually<F>(what: &str, check: F) -> Result<()>
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        if Instant::now() >= deadline {
            bail!("{what} never held");
        }
        sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

/// Polls a node's `/log` until it holds at least `len` entries.
pub async fn wait_for_log(
    client: &reqwest::Client,
    node: &TestNode,
    len: usize,
) -> Result<Vec<LogEntry>> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let log = get_log(client, node).await?;
        if log.len() >= len {
            return Ok(log);
        }
        if Instant::now() >= deadline {
            bail!("{} has {} entries, wanted {len}", node.name, log.len());
        }
        sleep(Duration::from_millis(20)).await;
    }
}
