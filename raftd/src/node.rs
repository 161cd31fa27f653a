//! Wiring for one cluster member.
//!
//! [`Node::open`] builds every shared piece (state machine, command registry,
//! peer transport, consensus engine, leader forwarder) in dependency order and
//! starts the engine. [`Node::bootstrap`] then settles cluster membership, and
//! [`Node::serve`] exposes the HTTP surface until shutdown.

use std::fs;
use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::bootstrap::{self, ClusterOrigin};
use crate::command::CommandRegistry;
use crate::config::{DEFAULT_HOST, NodeConfig};
use crate::engine::{ConsensusEngine, RaftEngine};
use crate::error::StartupError;
use crate::forward::LeaderForwarder;
use crate::identity::ClusterIdentity;
use crate::store::StateMachine;
use crate::transport::{HttpTransport, PeerTransport, server};

/// Shared by every request handler of a node.
///
/// `store` is the same state machine the engine applies into; handlers read
/// it directly and only write through `forwarder`.
pub struct NodeContext {
    pub engine: Arc<dyn ConsensusEngine>,
    pub store: Arc<StateMachine>,
    pub registry: Arc<CommandRegistry>,
    pub forwarder: LeaderForwarder,
}

/// A cluster member that has opened its data directory and started its
/// engine.
pub struct Node {
    config: NodeConfig,
    identity: ClusterIdentity,
    context: Arc<NodeContext>,
}

impl Node {
    /// Prepares the data directory, settles the node's identity and starts
    /// the engine. Nothing is served yet.
    pub async fn open(config: NodeConfig) -> Result<Self, StartupError> {
        let data_dir = config.data_dir.clone();
        fs::create_dir_all(&data_dir).map_err(|source| StartupError::DataDir {
            path: data_dir.clone(),
            source,
        })?;

        let host = if config.host.is_empty() {
            DEFAULT_HOST
        } else {
            config.host.as_str()
        };
        let identity = ClusterIdentity::load_or_create(&data_dir, host, config.port)?;
        let name = identity.peer_name();

        let store = StateMachine::open(&data_dir).map_err(|source| StartupError::DataDir {
            path: data_dir.clone(),
            source,
        })?;
        let store = Arc::new(store);
        let registry = Arc::new(CommandRegistry::builtin());
        let transport: Arc<dyn PeerTransport> =
            Arc::new(HttpTransport::new(config.rpc_timeout).map_err(StartupError::Client)?);

        let engine = RaftEngine::new(
            name.clone(),
            data_dir,
            store.clone(),
            registry.clone(),
            transport.clone(),
            config.tick_interval,
        );
        engine.start().await?;

        let engine: Arc<dyn ConsensusEngine> = engine;
        let forwarder = LeaderForwarder::new(engine.clone(), transport, config.forward.clone());
        info!(node = %name, data_dir = %config.data_dir.display(), "node opened");

        Ok(Self {
            config,
            identity,
            context: Arc::new(NodeContext {
                engine,
                store,
                registry,
                forwarder,
            }),
        })
    }

    /// The `host:port` name peers know this node by.
    pub fn name(&self) -> &str {
        self.context.engine.name()
    }

    /// The identity record pinned in the data directory.
    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    /// The consensus engine, for role and log queries.
    pub fn engine(&self) -> &Arc<dyn ConsensusEngine> {
        &self.context.engine
    }

    /// This node's applied state.
    pub fn store(&self) -> &Arc<StateMachine> {
        &self.context.store
    }

    /// Joins or founds the cluster according to the configured join target.
    pub async fn bootstrap(&self) -> Result<ClusterOrigin, StartupError> {
        let join = self.config.join.as_deref();
        let forwarder = self
            .context
            .forwarder
            .clone()
            .with_seed(join.map(str::to_owned));
        let origin = bootstrap::bootstrap(self.context.engine.as_ref(), &forwarder, join).await?;
        info!(node = %self.name(), %origin, "bootstrap complete");
        Ok(origin)
    }

    /// The HTTP routes of this node, bound to its shared context.
    pub fn router(&self) -> Router {
        server::router(self.context.clone())
    }

    /// Serves on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(node = %self.name(), %addr, "listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!(node = %self.name(), "server stopped");
        Ok(())
    }

    /// Serves on `listener` until the process receives ctrl-c.
    pub async fn run_until_ctrl_c(self, listener: TcpListener) -> io::Result<()> {
        self.serve(listener, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}
