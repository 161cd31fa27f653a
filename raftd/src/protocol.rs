//! Wire messages exchanged between peers.
//!
//! The field sets belong to the consensus protocol; this module only fixes
//! their JSON shape. Every struct rejects unknown fields and requires every
//! declared field, so a malformed body never decodes into a defaulted value.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::command::{Command, CommandRegistry};
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestVoteRequest {
    pub term: u64,
    pub last_log_index: u64,
    pub last_log_term: u64,
    pub candidate_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestVoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

/// Log replication from the leader. A `heartbeat` carries no entries and only
/// asserts leadership and the commit index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub commit_index: u64,
    pub leader_name: String,
    pub heartbeat: bool,
    pub entries: Vec<ReplicatedEntry>,
}

/// Reply to an append. On success `index` is the receiver's last matching
/// log index; on rejection it is the index the sender should resume from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub index: u64,
    pub commit_index: u64,
    pub success: bool,
}

/// Full state transfer for a follower whose log is too far behind. `voters`
/// is the membership as of `last_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotRequest {
    pub term: u64,
    pub leader_name: String,
    pub last_index: u64,
    pub last_term: u64,
    pub voters: Vec<u64>,
    #[serde(with = "base64_bytes")]
    pub state: Vec<u8>,
}

/// `success` is false when the receiver already held everything up to the
/// snapshot and ignored it; `commit_index` is its commit index either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotResponse {
    pub term: u64,
    pub commit_index: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Normal,
    ConfChange,
    ConfChangeV2,
}

/// One raw log entry as it travels between peers and into the journal.
///
/// Normal entries carry a [`CommandEnvelope`] in `data`, or nothing for the
/// no-op a new leader appends. Membership entries carry an encoded change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicatedEntry {
    pub index: u64,
    pub term: u64,
    pub kind: EntryKind,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub context: Vec<u8>,
}

impl ReplicatedEntry {
    /// A normal entry carrying `command`.
    pub fn command(index: u64, term: u64, command: &Command) -> Result<Self, serde_json::Error> {
        Ok(Self {
            index,
            term,
            kind: EntryKind::Normal,
            data: encode(&CommandEnvelope::new(command)?)?,
            context: Vec::new(),
        })
    }
}

/// A command as stored in a log entry: its logical name plus a JSON body, so
/// a receiver decodes it through the [`CommandRegistry`] and rejects names it
/// does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandEnvelope {
    pub command_name: String,
    pub command: serde_json::Value,
}

impl CommandEnvelope {
    pub fn new(command: &Command) -> Result<Self, serde_json::Error> {
        Ok(Self {
            command_name: command.name().to_string(),
            command: command.encode_body()?,
        })
    }

    /// Decodes the carried command, failing on names the registry lacks.
    pub fn command(&self, registry: &CommandRegistry) -> Result<Command, DecodeError> {
        registry.decode(&self.command_name, self.command.clone())
    }

    pub fn into_log_entry(self, index: u64, term: u64) -> LogEntry {
        LogEntry {
            index,
            term,
            command_name: self.command_name,
            command: self.command,
        }
    }
}

/// A committed command as `GET /log` reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub command_name: String,
    pub command: serde_json::Value,
}

impl LogEntry {
    pub fn command(&self, registry: &CommandRegistry) -> Result<Command, DecodeError> {
        registry.decode(&self.command_name, self.command.clone())
    }
}

/// Parses a JSON wire body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Serializes a wire body as JSON.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Serde adapter that carries opaque bytes as a base64 string.
pub(crate) mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}
