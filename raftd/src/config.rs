//! Node settings, assembled from the command line or built directly by tests.

use std::path::PathBuf;
use std::time::Duration;

use crate::forward::ForwardPolicy;

/// Advertised host when none is given.
pub const DEFAULT_HOST: &str = "localhost";
/// Listening port when none is given.
pub const DEFAULT_PORT: u16 = 4001;

/// Everything a node needs to start.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Holds the identity record, the journal and the replicated files.
    pub data_dir: PathBuf,
    /// Advertised host, used only when the data directory is new.
    pub host: String,
    /// Advertised and listening port, used only when the data directory is new.
    pub port: u16,
    /// Existing member to join through when the log is empty.
    pub join: Option<String>,
    pub forward: ForwardPolicy,
    /// Per-call timeout for outbound peer requests.
    pub rpc_timeout: Duration,
    /// One consensus clock tick. Heartbeats go out every 3 ticks and an
    /// election starts after 10 to 20 ticks without hearing from a leader.
    pub tick_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            join: None,
            forward: ForwardPolicy::default(),
            rpc_timeout: Duration::from_secs(2),
            tick_interval: Duration::from_millis(100),
        }
    }
}

impl NodeConfig {
    /// Defaults for everything except the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}
