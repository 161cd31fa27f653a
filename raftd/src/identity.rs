//! The `<data>/info` record that pins a node's advertised address.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::IdentityError;

/// File name of the identity record under the data directory.
pub const IDENTITY_FILE: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterIdentity {
    pub host: String,
    pub port: u16,
}

impl ClusterIdentity {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The `host:port` name peers know this node by.
    pub fn peer_name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(IDENTITY_FILE)
    }

    /// Reads the record, `None` when it does not exist yet.
    pub fn load(data_dir: &Path) -> Result<Option<Self>, IdentityError> {
        let path = Self::path(data_dir);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(IdentityError::Read { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| IdentityError::Parse { path, source })
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), IdentityError> {
        let path = Self::path(data_dir);
        let mut bytes = serde_json::to_vec(self).map_err(|source| IdentityError::Parse {
            path: path.clone(),
            source,
        })?;
        bytes.push(b'\n');
        fs::write(&path, bytes).map_err(|source| IdentityError::Write { path, source })
    }

    /// Returns the stored identity, writing `host:port` on the first start.
    /// Later starts keep the stored record even if the flags changed.
    pub fn load_or_create(data_dir: &Path, host: &str, port: u16) -> Result<Self, IdentityError> {
        if let Some(stored) = Self::load(data_dir)? {
            if stored.host != host || stored.port != port {
                warn!(
                    stored = %stored.peer_name(),
                    requested = %format!("{host}:{port}"),
                    "data directory already has an identity; flags ignored"
                );
            }
            return Ok(stored);
        }

        let identity = Self::new(host, port);
        identity.save(data_dir)?;
        info!(name = %identity.peer_name(), "wrote new identity");
        Ok(identity)
    }
}
