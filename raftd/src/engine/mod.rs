//! The consensus engine seam.
//!
//! Election, term bookkeeping, log persistence and commit rules live behind
//! [`ConsensusEngine`]. The binding layer only calls this interface: inbound
//! RPCs are delegated to it, client writes are submitted through
//! [`ConsensusEngine::execute`], and bootstrap asks it whether a log exists.
//!
//! [`RaftEngine`] is the implementation, an adapter over the `raft` crate's
//! `RawNode` that keeps the wire format and persistence on this side.

use std::fmt;

use async_trait::async_trait;

use crate::command::{Command, PeerRegistry};
use crate::error::EngineError;
use crate::protocol::{
    AppendEntriesRequest, AppendEntriesResponse, LogEntry, RequestVoteRequest,
    RequestVoteResponse, SnapshotRequest, SnapshotResponse,
};

mod codec;
pub mod journal;
mod runtime;

pub use runtime::RaftEngine;

/// The role a node currently plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        };
        f.write_str(label)
    }
}

/// Position of a command once the engine has committed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    pub index: u64,
    pub term: u64,
}

/// A consensus engine. Its [`PeerRegistry`] half is the membership change a
/// committed join applies through.
#[async_trait]
pub trait ConsensusEngine: PeerRegistry + Send + Sync {
    /// Recovers persisted state and starts background work.
    async fn start(&self) -> Result<(), EngineError>;

    /// True when nothing was ever committed on this node.
    fn is_log_empty(&self) -> bool;

    /// Forms a new single-member cluster with this node as leader.
    async fn initialize(&self) -> Result<(), EngineError>;

    /// Submits a command and waits until it is committed and applied locally.
    async fn execute(&self, command: Command) -> Result<CommitReceipt, EngineError>;

    async fn request_vote(
        &self,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse, EngineError>;

    async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, EngineError>;

    /// Replaces local state with a leader-provided snapshot. A snapshot that
    /// does not reach past the local commit index is ignored.
    async fn snapshot_recovery(
        &self,
        request: SnapshotRequest,
    ) -> Result<SnapshotResponse, EngineError>;

    fn state(&self) -> Role;

    /// The current leader's name, when one is known.
    fn leader(&self) -> Option<String>;

    /// Names of the cluster members, this node included once it joined.
    fn peers(&self) -> Vec<String>;

    /// Members counted toward quorum. A joined member shows up here once
    /// its voter change is applied on this node.
    fn voters(&self) -> Vec<String>;

    /// Committed commands in log order.
    fn log_entries(&self) -> Vec<LogEntry>;

    fn name(&self) -> &str;
}
