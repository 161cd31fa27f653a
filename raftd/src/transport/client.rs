//! Outbound half of the transport: consensus RPCs and forwarded writes sent
//! to peers with reqwest.
//!
//! Every call resolves the peer name to a URL, posts one body and treats any
//! non-2xx status as a failed call. Nothing is retried here; callers decide.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use super::{ForwardRequest, JSON, PeerTransport};
use crate::error::TransportError;
use crate::peer;
use crate::protocol::{
    self, AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse,
    SnapshotRequest, SnapshotResponse,
};

/// Outbound peer calls over reqwest. Holds nothing but a pooled client, so
/// every call is independent of the ones before it.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport whose calls give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn post_json<Req, Resp>(
        &self,
        peer: &str,
        segments: &[&str],
        request: &Req,
    ) -> Result<Resp, TransportError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = protocol::encode(request).map_err(|source| TransportError::Encode {
            peer: peer.to_string(),
            source,
        })?;
        let bytes = self.post(peer, segments, body, JSON).await?;
        protocol::decode(&bytes).map_err(|source| TransportError::Malformed {
            peer: peer.to_string(),
            source,
        })
    }

    async fn post(
        &self,
        peer: &str,
        segments: &[&str],
        body: Vec<u8>,
        content_type: &'static str,
    ) -> Result<Vec<u8>, TransportError> {
        let url = peer::endpoint(peer, segments).ok_or_else(|| TransportError::Address {
            peer: peer.to_string(),
        })?;
        debug!(%url, bytes = body.len(), "[send] POST");

        let unreachable = |source| TransportError::Unreachable {
            peer: peer.to_string(),
            source,
        };
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                peer: peer.to_string(),
                status,
            });
        }
        let bytes = response.bytes().await.map_err(unreachable)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn send_append_entries(
        &self,
        peer: &str,
        request: &AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError> {
        self.post_json(peer, &["log", "append"], request).await
    }

    async fn send_vote_request(
        &self,
        peer: &str,
        request: &RequestVoteRequest,
    ) -> Result<RequestVoteResponse, TransportError> {
        self.post_json(peer, &["vote"], request).await
    }

    async fn send_snapshot(
        &self,
        peer: &str,
        request: &SnapshotRequest,
    ) -> Result<SnapshotResponse, TransportError> {
        self.post_json(peer, &["snapshot"], request).await
    }

    async fn forward(&self, peer: &str, request: &ForwardRequest) -> Result<(), TransportError> {
        let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
        self.post(peer, &segments, request.body.clone(), request.content_type)
            .await
            .map(|_| ())
    }
}
