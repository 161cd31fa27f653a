//! HTTP+JSON transport for consensus messages and forwarded writes.
//!
//! [`server`] holds the inbound axum handlers, [`client`] the outbound
//! reqwest calls. Both sides share the paths below and the wire shapes in
//! [`crate::protocol`].

use async_trait::async_trait;

use crate::command::{Command, JoinCommand, WriteCommand, WriteFileCommand};
use crate::error::TransportError;
use crate::protocol::{
    AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse,
    SnapshotRequest, SnapshotResponse,
};

pub mod client;
pub mod server;

pub use client::HttpTransport;

/// Content types of the bodies nodes exchange.
pub const JSON: &str = "application/json";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT: &str = "text/plain; charset=utf-8";

/// Outbound calls a node makes to its peers.
///
/// A decoded negative answer (vote denied, append rejected) is `Ok`; only a
/// call that produced no usable answer is an error, and every such error is
/// retriable.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send_append_entries(
        &self,
        peer: &str,
        request: &AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError>;

    async fn send_vote_request(
        &self,
        peer: &str,
        request: &RequestVoteRequest,
    ) -> Result<RequestVoteResponse, TransportError>;

    async fn send_snapshot(
        &self,
        peer: &str,
        request: &SnapshotRequest,
    ) -> Result<SnapshotResponse, TransportError>;

    /// Replays a client write against `peer`'s own write endpoint.
    async fn forward(&self, peer: &str, request: &ForwardRequest) -> Result<(), TransportError>;
}

/// A client write in the form it takes on the wire: path segments plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub segments: Vec<String>,
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

impl ForwardRequest {
    pub fn from_command(command: &Command) -> Result<Self, serde_json::Error> {
        let request = match command {
            Command::Write(WriteCommand { key, value }) => Self {
                segments: vec!["db".into(), key.clone()],
                body: value.clone().into_bytes(),
                content_type: TEXT,
            },
            Command::WriteFile(WriteFileCommand { filename, content }) => Self {
                segments: vec!["files".into(), filename.clone()],
                body: content.clone(),
                content_type: OCTET_STREAM,
            },
            Command::Join(join @ JoinCommand { .. }) => Self {
                segments: vec!["join".into()],
                body: serde_json::to_vec(join)?,
                content_type: JSON,
            },
        };
        Ok(request)
    }

    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}
