//! Inbound HTTP surface of a node.
//!
//! Consensus endpoints decode the body, hand it to the engine and encode the
//! engine's answer as-is. Write endpoints go through the leader forwarder.
//! Any body that fails to decode is answered with a bare 500.

use std::fmt::Display;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use super::{JSON, OCTET_STREAM, TEXT};
use crate::command::{self, Command, JOIN, WriteCommand, WriteFileCommand};
use crate::error::DecodeError;
use crate::node::NodeContext;
use crate::protocol::{self, AppendEntriesRequest, RequestVoteRequest, SnapshotRequest};

type Ctx = State<Arc<NodeContext>>;

/// Every endpoint of a node, bound to `ctx`.
pub fn router(ctx: Arc<NodeContext>) -> Router {
    Router::new()
        .route("/join", post(join))
        .route("/vote", post(vote))
        .route("/log", get(log))
        .route("/log/append", post(append_entries))
        .route("/snapshot", post(snapshot))
        .route("/files/:name", get(read_file).post(write_file))
        .route("/db/:key", get(read_key).post(write_key))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(ctx)
}

async fn join(State(ctx): Ctx, body: Bytes) -> Response {
    match ctx.registry.decode_slice(JOIN, &body) {
        Ok(command) => submit(&ctx, "/join", command).await,
        Err(err) => undecodable("/join", err),
    }
}

async fn vote(State(ctx): Ctx, body: Bytes) -> Response {
    let request: RequestVoteRequest = match protocol::decode(&body) {
        Ok(request) => request,
        Err(err) => return undecodable("/vote", err),
    };
    match ctx.engine.request_vote(request).await {
        Ok(response) => json(&response),
        Err(err) => failed("/vote", err),
    }
}

async fn append_entries(State(ctx): Ctx, body: Bytes) -> Response {
    let request: AppendEntriesRequest = match protocol::decode(&body) {
        Ok(request) => request,
        Err(err) => return undecodable("/log/append", err),
    };
    match ctx.engine.append_entries(request).await {
        Ok(response) => json(&response),
        Err(err) => failed("/log/append", err),
    }
}

async fn snapshot(State(ctx): Ctx, body: Bytes) -> Response {
    let request: SnapshotRequest = match protocol::decode(&body) {
        Ok(request) => request,
        Err(err) => return undecodable("/snapshot", err),
    };
    match ctx.engine.snapshot_recovery(request).await {
        Ok(response) => json(&response),
        Err(err) => failed("/snapshot", err),
    }
}

async fn log(State(ctx): Ctx) -> Response {
    json(&ctx.engine.log_entries())
}

async fn read_file(State(ctx): Ctx, Path(name): Path<String>) -> Response {
    if command::validate_filename(&name).is_err() {
        return StatusCode::OK.into_response();
    }
    match ctx.store.read_file(&name) {
        Ok(Some(content)) => ([(header::CONTENT_TYPE, OCTET_STREAM)], content).into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(err) => failed("/files", err),
    }
}

async fn write_file(State(ctx): Ctx, Path(name): Path<String>, body: Bytes) -> Response {
    let command = Command::WriteFile(WriteFileCommand {
        filename: name,
        content: body.to_vec(),
    });
    submit(&ctx, "/files", command).await
}

async fn read_key(State(ctx): Ctx, Path(key): Path<String>) -> Response {
    match ctx.store.get(&key) {
        Some(value) => ([(header::CONTENT_TYPE, TEXT)], value).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

async fn write_key(State(ctx): Ctx, Path(key): Path<String>, body: Bytes) -> Response {
    let value = match String::from_utf8(body.to_vec()) {
        Ok(value) => value,
        Err(_) => return undecodable("/db", DecodeError::NotUtf8),
    };
    submit(&ctx, "/db", Command::Write(WriteCommand { key, value })).await
}

async fn submit(ctx: &NodeContext, route: &'static str, command: Command) -> Response {
    match ctx.forwarder.submit(command).await {
        Ok(outcome) => {
            debug!(route, ?outcome, "write committed");
            StatusCode::OK.into_response()
        }
        Err(err) => failed(route, err),
    }
}

fn json<T: Serialize>(value: &T) -> Response {
    match protocol::encode(value) {
        Ok(bytes) => ([(header::CONTENT_TYPE, JSON)], bytes).into_response(),
        Err(err) => failed("encode", err),
    }
}

fn undecodable(route: &'static str, err: DecodeError) -> Response {
    debug!(route, error = %err, "[recv] undecodable body");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn failed(route: &'static str, err: impl Display) -> Response {
    warn!(route, error = %err, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
