//! Error taxonomy for the binding layer.
//!
//! Each enum corresponds to one failure class: decode failures never reach the
//! engine, validation failures never reach the log, transport failures are
//! retriable, and startup failures abort the process before anything serves.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A wire body could not be turned into a typed message or command.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("body is not valid utf-8")]
    NotUtf8,
}

/// A command was rejected before it reached the log.
#[derive(Debug, Error)]
#[error("{command} rejected: {reason}")]
pub struct ValidationError {
    pub command: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(command: &'static str, reason: impl Into<String>) -> Self {
        Self {
            command,
            reason: reason.into(),
        }
    }
}

/// Applying a committed command to local state failed.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("unable to write {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to register peer {name}: {reason}")]
    Membership { name: String, reason: String },
}

/// The command registry was populated twice with the same logical name.
#[derive(Debug, Error)]
#[error("command '{0}' is already registered")]
pub struct RegistryError(pub &'static str);

/// Failures reported by a consensus engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not the leader (current leader: {leader:?})")]
    NotLeader { leader: Option<String> },

    #[error("cluster is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unable to encode log entry: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("snapshot state is unreadable: {0}")]
    Snapshot(#[source] io::Error),

    #[error("journal i/o failed: {0}")]
    Journal(#[from] io::Error),

    #[error("consensus failure: {0}")]
    Raft(#[from] raft::Error),

    #[error("engine is stopped")]
    Stopped,
}

/// An outbound call to a peer did not produce a usable response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer name '{peer}' is not a valid address")]
    Address { peer: String },

    #[error("unable to encode request for {peer}: {source}")]
    Encode {
        peer: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("peer {peer} unreachable: {source}")]
    Unreachable {
        peer: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("peer {peer} answered {status}")]
    Status {
        peer: String,
        status: reqwest::StatusCode,
    },

    #[error("peer {peer} sent a malformed response: {source}")]
    Malformed {
        peer: String,
        #[source]
        source: DecodeError,
    },
}

/// The leader-forwarding client could not get a command committed.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("commit rejected: {0}")]
    Rejected(#[source] EngineError),

    #[error("unable to encode forwarded request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("gave up after {attempts} attempts in {elapsed:?}")]
    Timeout { attempts: u32, elapsed: Duration },
}

/// The persisted identity record could not be read or written.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Anything that stops a node from reaching the serving state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unable to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("unable to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("engine failed: {0}")]
    Engine(#[from] EngineError),

    #[error("unable to join {target}: {source}")]
    Join {
        target: String,
        #[source]
        source: ForwardError,
    },
}
