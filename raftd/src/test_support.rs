//! Doubles for unit tests: transports that never touch the network and an
//! engine whose leadership is scripted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::StatusCode;
use tokio::time::{sleep, timeout};

use crate::command::{Command, CommandRegistry, PeerRegistry};
use crate::engine::{CommitReceipt, ConsensusEngine, RaftEngine, Role};
use crate::error::{ApplyError, EngineError, TransportError};
use crate::forward::ForwardPolicy;
use crate::protocol::{
    AppendEntriesRequest, AppendEntriesResponse, LogEntry, RequestVoteRequest,
    RequestVoteResponse, SnapshotRequest, SnapshotResponse,
};
use crate::store::StateMachine;
use crate::transport::{ForwardRequest, PeerTransport};

const TEST_TICK: Duration = Duration::from_millis(20);

pub(crate) fn quick_policy() -> ForwardPolicy {
    ForwardPolicy {
        max_attempts: 50,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        deadline: Duration::from_secs(2),
    }
}

/// Polls `check` until it holds or five seconds pass.
pub(crate) async fn eventually<F>(check: F) -> anyhow::Result<()>
where
    F: Fn() -> bool,
{
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("condition never held")
}

fn unreachable(peer: &str) -> TransportError {
    TransportError::Address {
        peer: peer.to_string(),
    }
}

impl RaftEngine {
    /// A started engine with no reachable peers, rooted at `dir`.
    pub(crate) async fn standalone(name: &str, dir: &Path) -> anyhow::Result<Arc<Self>> {
        let store = Arc::new(StateMachine::open(dir)?);
        let engine = RaftEngine::new(
            name,
            dir,
            store,
            Arc::new(CommandRegistry::builtin()),
            Arc::new(UnreachableTransport),
            TEST_TICK,
        );
        engine.start().await?;
        Ok(engine)
    }
}

/// Every call fails as if the peer name did not resolve.
pub(crate) struct UnreachableTransport;

#[async_trait]
impl PeerTransport for UnreachableTransport {
    async fn send_append_entries(
        &self,
        peer: &str,
        _request: &AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError> {
        Err(unreachable(peer))
    }

    async fn send_vote_request(
        &self,
        peer: &str,
        _request: &RequestVoteRequest,
    ) -> Result<RequestVoteResponse, TransportError> {
        Err(unreachable(peer))
    }

    async fn send_snapshot(
        &self,
        peer: &str,
        _request: &SnapshotRequest,
    ) -> Result<SnapshotResponse, TransportError> {
        Err(unreachable(peer))
    }

    async fn forward(&self, peer: &str, _request: &ForwardRequest) -> Result<(), TransportError> {
        Err(unreachable(peer))
    }
}

/// Routes consensus calls straight into in-process engines by name.
#[derive(Clone, Default)]
pub(crate) struct Loopback {
    engines: Arc<RwLock<HashMap<String, Weak<RaftEngine>>>>,
}

impl Loopback {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A started engine reachable by the others under `name`.
    pub(crate) async fn engine(&self, name: &str, dir: &Path) -> anyhow::Result<Arc<RaftEngine>> {
        let store = Arc::new(StateMachine::open(dir)?);
        let engine = RaftEngine::new(
            name,
            dir,
            store,
            Arc::new(CommandRegistry::builtin()),
            Arc::new(self.clone()),
            TEST_TICK,
        );
        self.engines
            .write()
            .insert(name.to_string(), Arc::downgrade(&engine));
        engine.start().await?;
        Ok(engine)
    }

    fn lookup(&self, peer: &str) -> Result<Arc<RaftEngine>, TransportError> {
        self.engines
            .read()
            .get(peer)
            .and_then(Weak::upgrade)
            .ok_or_else(|| unreachable(peer))
    }
}

fn rejected(peer: &str) -> TransportError {
    TransportError::Status {
        peer: peer.to_string(),
        status: StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[async_trait]
impl PeerTransport for Loopback {
    async fn send_append_entries(
        &self,
        peer: &str,
        request: &AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError> {
        let engine = self.lookup(peer)?;
        engine
            .append_entries(request.clone())
            .await
            .map_err(|_| rejected(peer))
    }

    async fn send_vote_request(
        &self,
        peer: &str,
        request: &RequestVoteRequest,
    ) -> Result<RequestVoteResponse, TransportError> {
        let engine = self.lookup(peer)?;
        engine
            .request_vote(request.clone())
            .await
            .map_err(|_| rejected(peer))
    }

    async fn send_snapshot(
        &self,
        peer: &str,
        request: &SnapshotRequest,
    ) -> Result<SnapshotResponse, TransportError> {
        let engine = self.lookup(peer)?;
        engine
            .snapshot_recovery(request.clone())
            .await
            .map_err(|_| rejected(peer))
    }

    async fn forward(&self, peer: &str, _request: &ForwardRequest) -> Result<(), TransportError> {
        Err(unreachable(peer))
    }
}

/// Records forwarded writes and either accepts or fails all of them.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    forwards: Mutex<Vec<(String, ForwardRequest)>>,
    fail: bool,
}

impl RecordingTransport {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn forwarded(&self) -> Vec<(String, ForwardRequest)> {
        self.forwards.lock().clone()
    }
}

#[async_trait]
impl PeerTransport for RecordingTransport {
    async fn send_append_entries(
        &self,
        peer: &str,
        _request: &AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError> {
        Err(unreachable(peer))
    }

    async fn send_vote_request(
        &self,
        peer: &str,
        _request: &RequestVoteRequest,
    ) -> Result<RequestVoteResponse, TransportError> {
        Err(unreachable(peer))
    }

    async fn send_snapshot(
        &self,
        peer: &str,
        _request: &SnapshotRequest,
    ) -> Result<SnapshotResponse, TransportError> {
        Err(unreachable(peer))
    }

    async fn forward(&self, peer: &str, request: &ForwardRequest) -> Result<(), TransportError> {
        self.forwards
            .lock()
            .push((peer.to_string(), request.clone()));
        if self.fail {
            return Err(rejected(peer));
        }
        Ok(())
    }
}

/// Commits every forwarded write on `leader`, then loses the first reply.
pub(crate) struct CommitThenDrop {
    leader: Arc<RaftEngine>,
    command: Command,
    pub(crate) calls: AtomicU32,
}

impl CommitThenDrop {
    pub(crate) fn new(leader: Arc<RaftEngine>, command: Command) -> Self {
        Self {
            leader,
            command,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PeerTransport for CommitThenDrop {
    async fn send_append_entries(
        &self,
        peer: &str,
        _request: &AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError> {
        Err(unreachable(peer))
    }

    async fn send_vote_request(
        &self,
        peer: &str,
        _request: &RequestVoteRequest,
    ) -> Result<RequestVoteResponse, TransportError> {
        Err(unreachable(peer))
    }

    async fn send_snapshot(
        &self,
        peer: &str,
        _request: &SnapshotRequest,
    ) -> Result<SnapshotResponse, TransportError> {
        Err(unreachable(peer))
    }

    async fn forward(&self, peer: &str, _request: &ForwardRequest) -> Result<(), TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.leader
            .execute(self.command.clone())
            .await
            .map_err(|_| rejected(peer))?;
        if call == 1 {
            return Err(TransportError::Status {
                peer: peer.to_string(),
                status: StatusCode::GATEWAY_TIMEOUT,
            });
        }
        Ok(())
    }
}

/// An engine whose role and leader are driven by the test.
pub(crate) struct ScriptedEngine {
    name: String,
    role: Mutex<Role>,
    leader_script: Mutex<Option<(u32, String)>>,
    leader_queries: AtomicU32,
    log_empty: AtomicBool,
    executed: Mutex<Vec<Command>>,
}

impl ScriptedEngine {
    pub(crate) fn follower(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: Mutex::new(Role::Follower),
            leader_script: Mutex::new(None),
            leader_queries: AtomicU32::new(0),
            log_empty: AtomicBool::new(true),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// A follower that already holds committed entries.
    pub(crate) fn member(name: &str) -> Self {
        let engine = Self::follower(name);
        engine.log_empty.store(false, Ordering::SeqCst);
        engine
    }

    /// `leader()` answers `None` for the first `queries` calls, then `leader`.
    pub(crate) fn reveal_leader_after(&self, queries: u32, leader: &str) {
        *self.leader_script.lock() = Some((queries, leader.to_string()));
    }

    pub(crate) fn leader_queries(&self) -> u32 {
        self.leader_queries.load(Ordering::SeqCst)
    }

    pub(crate) fn executed(&self) -> Vec<Command> {
        self.executed.lock().clone()
    }
}

impl PeerRegistry for ScriptedEngine {
    fn add_peer(&self, name: &str) -> Result<bool, ApplyError> {
        Ok(!name.is_empty())
    }
}

#[async_trait]
impl ConsensusEngine for ScriptedEngine {
    async fn start(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn is_log_empty(&self) -> bool {
        self.log_empty.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        *self.role.lock() = Role::Leader;
        Ok(())
    }

    async fn execute(&self, command: Command) -> Result<CommitReceipt, EngineError> {
        if *self.role.lock() != Role::Leader {
            return Err(EngineError::NotLeader { leader: None });
        }
        let mut executed = self.executed.lock();
        executed.push(command);
        self.log_empty.store(false, Ordering::SeqCst);
        Ok(CommitReceipt {
            index: executed.len() as u64,
            term: 1,
        })
    }

    async fn request_vote(
        &self,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse, EngineError> {
        Ok(RequestVoteResponse {
            term: request.term,
            vote_granted: false,
        })
    }

    async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, EngineError> {
        Ok(AppendEntriesResponse {
            term: request.term,
            index: 0,
            commit_index: 0,
            success: false,
        })
    }

    async fn snapshot_recovery(
        &self,
        request: SnapshotRequest,
    ) -> Result<SnapshotResponse, EngineError> {
        Ok(SnapshotResponse {
            term: request.term,
            commit_index: request.last_index,
            success: true,
        })
    }

    fn state(&self) -> Role {
        *self.role.lock()
    }

    fn leader(&self) -> Option<String> {
        let query = self.leader_queries.fetch_add(1, Ordering::SeqCst) + 1;
        match &*self.leader_script.lock() {
            Some((after, leader)) if query > *after => Some(leader.clone()),
            _ => None,
        }
    }

    fn peers(&self) -> Vec<String> {
        Vec::new()
    }

    fn voters(&self) -> Vec<String> {
        Vec::new()
    }

    fn log_entries(&self) -> Vec<LogEntry> {
        Vec::new()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
