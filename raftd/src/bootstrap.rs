//! First-start decision: keep an existing log, found a cluster, or join one.

use std::fmt;

use tracing::info;

use crate::command::{Command, JoinCommand};
use crate::engine::ConsensusEngine;
use crate::error::StartupError;
use crate::forward::LeaderForwarder;

/// How this node came to be part of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOrigin {
    /// The log was already populated; nothing to do.
    Existing,
    /// Formed a new cluster with this node as the sole leader.
    Initialized,
    /// Joined through `via`.
    Joined { via: String },
}

impl fmt::Display for ClusterOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterOrigin::Existing => f.write_str("recovered existing log"),
            ClusterOrigin::Initialized => f.write_str("initialized new cluster"),
            ClusterOrigin::Joined { via } => write!(f, "joined cluster via {via}"),
        }
    }
}

/// Runs once, before the listener serves. `forwarder` should be seeded with
/// `join` so the request can go out before any leader is known.
pub async fn bootstrap(
    engine: &dyn ConsensusEngine,
    forwarder: &LeaderForwarder,
    join: Option<&str>,
) -> Result<ClusterOrigin, StartupError> {
    if !engine.is_log_empty() {
        return Ok(ClusterOrigin::Existing);
    }

    let Some(target) = join else {
        engine.initialize().await?;
        return Ok(ClusterOrigin::Initialized);
    };

    info!(node = %engine.name(), via = target, "asking to join");
    let command = Command::Join(JoinCommand {
        name: engine.name().to_string(),
    });
    forwarder
        .submit(command)
        .await
        .map_err(|source| StartupError::Join {
            target: target.to_string(),
            source,
        })?;
    Ok(ClusterOrigin::Joined {
        via: target.to_string(),
    })
}
