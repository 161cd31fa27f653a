//! Command-line surface of the `raftd` binary.
//!
//! Flags map one-to-one onto [`NodeConfig`]; the verbosity switches pick the
//! default `tracing` filter, which `RUST_LOG` still overrides.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{DEFAULT_HOST, DEFAULT_PORT, NodeConfig};
use crate::forward::ForwardPolicy;

/// Parsed command line of one node.
#[derive(Parser, Debug)]
#[command(author, version, about = "Replicated key/value and file store node", long_about = None)]
pub struct Cli {
    /// Data directory. Defaults to the current directory.
    pub data_path: Option<PathBuf>,

    /// Hostname advertised to peers on first start.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on and advertise on first start.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Existing member (host:port) to join when the log is empty.
    #[arg(long)]
    pub join: Option<String>,

    /// Verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Debug logging.
    #[arg(long)]
    pub debug: bool,

    /// Trace logging, including every peer request.
    #[arg(long)]
    pub trace: bool,

    /// Attempts before a write gives up.
    #[arg(long, default_value_t = 20)]
    pub forward_attempts: u32,

    /// Overall deadline for one write, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub forward_timeout_ms: u64,

    /// Timeout for a single peer request, in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    pub rpc_timeout_ms: u64,

    /// Consensus clock tick, in milliseconds. Heartbeats go out every 3 ticks.
    #[arg(long, default_value_t = 100)]
    pub tick_ms: u64,
}

impl Cli {
    /// Log filter implied by the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        if self.trace {
            "trace"
        } else if self.debug || self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// The node settings these flags describe, with defaults filled in.
    pub fn node_config(&self) -> NodeConfig {
        let defaults = NodeConfig::default();
        NodeConfig {
            data_dir: self.data_path.clone().unwrap_or(defaults.data_dir),
            host: self.host.clone(),
            port: self.port,
            join: self.join.clone(),
            forward: ForwardPolicy {
                max_attempts: self.forward_attempts.max(1),
                deadline: Duration::from_millis(self.forward_timeout_ms),
                ..defaults.forward
            },
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            tick_interval: Duration::from_millis(self.tick_ms.max(1)),
        }
    }
}
