//! Binding layer between a consensus engine and an HTTP cluster.
//!
//! A node exposes the engine's protocol messages over HTTP+JSON, turns client
//! writes into committed commands applied to a local state machine, and
//! forwards writes it cannot commit itself to the current leader.
//!
//! # Architecture
//!
//! - **Transport**: axum handlers for inbound RPCs and writes, reqwest for
//!   outbound calls to peers
//! - **Forwarder**: applies locally on the leader, otherwise replays the write
//!   against the leader with bounded, jittered retries
//! - **Bootstrap**: on an empty log, either founds a cluster or joins one
//!   before the listener starts
//! - **Engine**: election and commit rules sit behind [`engine::ConsensusEngine`];
//!   [`engine::RaftEngine`] drives the `raft` crate's `RawNode` and journals
//!   its log under the data directory
//!
//! Handlers reach everything through an explicit [`node::NodeContext`]; there
//! is no process-wide state.
//!
//! # Modules
//!
//! - [`command`]: replicated commands and the name-to-decoder registry
//! - [`store`]: key/value map and file area mutated by applied commands
//! - [`protocol`]: wire messages and log entries
//! - [`transport`]: HTTP server and client
//! - [`forward`]: leader-forwarding write path
//! - [`bootstrap`]: found-or-join decision
//! - [`identity`]: persisted `host:port` record
//! - [`node`]: wires the pieces together and serves

pub mod bootstrap;
pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod forward;
pub mod identity;
pub mod node;
pub mod peer;
pub mod protocol;
pub mod store;
pub mod transport;

#[cfg(test)]
mod test_support;
