//! Commands that flow through the replicated log.
//!
//! The set is closed: [`Command`] is a tagged enum and validate/apply dispatch
//! over its variants. What stays open is decoding, which goes through a
//! [`CommandRegistry`] keyed by each command's logical name so that entries
//! carrying names this node does not know are refused instead of skipped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::error::{ApplyError, DecodeError, RegistryError, ValidationError};
use crate::protocol::base64_bytes;
use crate::store::StateMachine;

/// Logical command names, as carried in log entries and used for registry
/// lookup.
pub const WRITE: &str = "write";
pub const FILE_WRITE: &str = "file:write";
pub const JOIN: &str = "join";

/// Upserts `key` to `value` in the key/value map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteCommand {
    pub key: String,
    pub value: String,
}

/// Writes `content` to `filename` in the node's file area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteFileCommand {
    pub filename: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

/// Adds the peer called `name` to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinCommand {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Write(WriteCommand),
    WriteFile(WriteFileCommand),
    Join(JoinCommand),
}

/// Membership hook handed to `apply`. The consensus engine implements it, so
/// a committed join becomes a membership change in the engine.
pub trait PeerRegistry {
    /// Registers `name`; returns `false` if it was already a member.
    fn add_peer(&self, name: &str) -> Result<bool, ApplyError>;
}

/// Everything a command may touch while being applied.
pub struct ApplyContext<'a> {
    pub store: &'a StateMachine,
    pub peers: &'a dyn PeerRegistry,
}

impl Command {
    /// The logical name used for wire tagging and registry lookup.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Write(_) => WRITE,
            Command::WriteFile(_) => FILE_WRITE,
            Command::Join(_) => JOIN,
        }
    }

    pub fn encode_body(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Command::Write(command) => serde_json::to_value(command),
            Command::WriteFile(command) => serde_json::to_value(command),
            Command::Join(command) => serde_json::to_value(command),
        }
    }

    /// Checks run before a command is submitted to the log.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Command::Write(WriteCommand { key, .. }) => {
                if key.is_empty() {
                    return Err(ValidationError::new(WRITE, "key is empty"));
                }
                Ok(())
            }
            Command::WriteFile(WriteFileCommand { filename, .. }) => {
                validate_filename(filename).map_err(|reason| ValidationError::new(FILE_WRITE, reason))
            }
            Command::Join(JoinCommand { name }) => {
                if name.trim().is_empty() {
                    return Err(ValidationError::new(JOIN, "peer name is empty"));
                }
                Ok(())
            }
        }
    }

    /// Applies a committed command. Called once per committed entry, in order.
    pub fn apply(&self, ctx: &ApplyContext<'_>) -> Result<(), ApplyError> {
        match self {
            Command::Write(WriteCommand { key, value }) => {
                ctx.store.put(key.clone(), value.clone());
                Ok(())
            }
            Command::WriteFile(WriteFileCommand { filename, content }) => {
                ctx.store
                    .write_file(filename, content)
                    .map(|_| ())
                    .map_err(|source| ApplyError::File {
                        path: ctx.store.files_dir().join(filename),
                        source,
                    })
            }
            Command::Join(JoinCommand { name }) => {
                if !ctx.peers.add_peer(name)? {
                    debug!(peer = %name, "join for a known member ignored");
                }
                Ok(())
            }
        }
    }
}

pub(crate) fn validate_filename(filename: &str) -> Result<(), &'static str> {
    if filename.is_empty() {
        return Err("filename is empty");
    }
    if filename == "." || filename == ".." {
        return Err("filename must name a file");
    }
    if filename.contains(['/', '\\', '\0']) {
        return Err("filename must be a single path component");
    }
    Ok(())
}

pub type Decoder = fn(serde_json::Value) -> Result<Command, serde_json::Error>;

/// Maps logical command names to their decoders.
#[derive(Default)]
pub struct CommandRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `write`, `file:write` and `join`.
    pub fn builtin() -> Self {
        let builtin: [(&'static str, Decoder); 3] = [
            (WRITE, |body| decode_as(body, Command::Write)),
            (FILE_WRITE, |body| decode_as(body, Command::WriteFile)),
            (JOIN, |body| decode_as(body, Command::Join)),
        ];
        Self {
            decoders: builtin.into_iter().collect(),
        }
    }

    pub fn register(&mut self, name: &'static str, decoder: Decoder) -> Result<(), RegistryError> {
        if self.decoders.contains_key(name) {
            return Err(RegistryError(name));
        }
        self.decoders.insert(name, decoder);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    pub fn decode(&self, name: &str, body: serde_json::Value) -> Result<Command, DecodeError> {
        let decoder = self
            .decoders
            .get(name)
            .ok_or_else(|| DecodeError::UnknownCommand(name.to_string()))?;
        Ok(decoder(body)?)
    }

    /// Decodes a raw request body as the command registered under `name`.
    pub fn decode_slice(&self, name: &str, bytes: &[u8]) -> Result<Command, DecodeError> {
        let body: serde_json::Value = serde_json::from_slice(bytes)?;
        self.decode(name, body)
    }
}

fn decode_as<T, F>(body: serde_json::Value, wrap: F) -> Result<Command, serde_json::Error>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Command,
{
    serde_json::from_value(body).map(wrap)
}
