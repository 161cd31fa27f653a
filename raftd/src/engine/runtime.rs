//! [`RaftEngine`]: the consensus engine as an adapter over `raft::RawNode`.
//!
//! One worker task owns the `RawNode` and its `MemStorage`. Everything else
//! reaches it through a channel. HTTP handlers submit proposals and inbound
//! peer messages and wait on a oneshot for the outcome; spawned peer calls
//! hand the replies back. The worker ticks raft's logical clock and drains
//! every `Ready`: the journal is written first, then storage, then committed
//! entries are applied, then messages go out.
//!
//! Membership is carried by the log. A committed join admits the name, and
//! the leader then proposes a voter change for every admitted member raft
//! does not count yet, founder included, so followers learn the full voter
//! set from the entries they replicate.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use prost::Message as _;
use raft::prelude::{
    ConfChange, ConfChangeType, ConfState, Config, Entry, EntryType, Message, MessageType, RawNode,
    Snapshot,
};
use raft::storage::MemStorage;
use raft::{SnapshotStatus, StateRole, Storage, INVALID_ID};
use slog::{o, Logger};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::codec::{self, Outbound, Reply};
use super::journal::{Journal, Record};
use super::{CommitReceipt, ConsensusEngine, Role};
use crate::command::{ApplyContext, Command, CommandRegistry, PeerRegistry};
use crate::error::{ApplyError, EngineError};
use crate::peer::{peer_id, Roster};
use crate::protocol::{
    self, AppendEntriesRequest, AppendEntriesResponse, CommandEnvelope, LogEntry,
    RequestVoteRequest, RequestVoteResponse, SnapshotRequest, SnapshotResponse,
};
use crate::store::StateMachine;
use crate::transport::PeerTransport;

/// Ticks between leader heartbeats.
const HEARTBEAT_TICKS: usize = 3;

/// Ticks without hearing from a leader before a follower campaigns. Raft
/// draws the actual timeout from `[ELECTION_TICKS, 2 * ELECTION_TICKS)`.
const ELECTION_TICKS: usize = 10;

const MAX_INFLIGHT_MSGS: usize = 256;
const MAX_SIZE_PER_MSG: u64 = 1024 * 1024;

/// The tikv/raft library requires a logger; events are traced at this layer.
fn silent_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

fn raft_config(id: u64, applied: u64) -> Config {
    Config {
        id,
        election_tick: ELECTION_TICKS,
        heartbeat_tick: HEARTBEAT_TICKS,
        max_inflight_msgs: MAX_INFLIGHT_MSGS,
        max_size_per_msg: MAX_SIZE_PER_MSG,
        applied,
        ..Default::default()
    }
}

type Responder<T> = oneshot::Sender<Result<T, EngineError>>;

enum Request {
    Initialize {
        respond_to: Responder<()>,
    },
    Propose {
        command: Command,
        respond_to: Responder<CommitReceipt>,
    },
    /// An inbound peer message; the answer raft produces is handed back.
    Step {
        message: Message,
        respond_to: Responder<Reply>,
    },
    /// A peer's reply to a message this node sent.
    Deliver { reply: Message, snapshot: bool },
    Unreachable { peer: u64, snapshot: bool },
}

/// What the synchronous queries read, published by the worker.
#[derive(Debug)]
struct Status {
    role: Role,
    leader: Option<String>,
    last_index: u64,
    roster: Roster,
    voters: Vec<String>,
    log: Vec<LogEntry>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            role: Role::Follower,
            leader: None,
            last_index: 0,
            roster: Roster::new(),
            voters: Vec::new(),
            log: Vec::new(),
        }
    }
}

/// [`ConsensusEngine`] backed by a `raft::RawNode` worker task.
pub struct RaftEngine {
    me: Weak<RaftEngine>,
    name: String,
    id: u64,
    data_dir: PathBuf,
    store: Arc<StateMachine>,
    registry: Arc<CommandRegistry>,
    transport: Arc<dyn PeerTransport>,
    tick: Duration,
    status: Arc<RwLock<Status>>,
    requests: mpsc::UnboundedSender<Request>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Request>>>,
}

impl RaftEngine {
    /// Builds an engine for the node called `name`. Nothing runs until
    /// [`ConsensusEngine::start`]; `tick` is the period of raft's clock.
    pub fn new(
        name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        store: Arc<StateMachine>,
        registry: Arc<CommandRegistry>,
        transport: Arc<dyn PeerTransport>,
        tick: Duration,
    ) -> Arc<Self> {
        let name = name.into();
        let (requests, inbox) = mpsc::unbounded_channel();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            id: peer_id(&name),
            name,
            data_dir: data_dir.into(),
            store,
            registry,
            transport,
            tick,
            status: Arc::new(RwLock::new(Status::default())),
            requests,
            inbox: Mutex::new(Some(inbox)),
        })
    }

    /// The state machine committed commands are applied to.
    pub fn store(&self) -> &Arc<StateMachine> {
        &self.store
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(Responder<T>) -> Request,
    ) -> Result<T, EngineError> {
        let (respond_to, response) = oneshot::channel();
        self.requests
            .send(request(respond_to))
            .map_err(|_| EngineError::Stopped)?;
        response.await.map_err(|_| EngineError::Stopped)?
    }

    async fn step(&self, message: Message) -> Result<Reply, EngineError> {
        self.call(|respond_to| Request::Step {
            message,
            respond_to,
        })
        .await
    }
}

impl PeerRegistry for RaftEngine {
    fn add_peer(&self, name: &str) -> Result<bool, ApplyError> {
        if name.trim().is_empty() {
            return Err(ApplyError::Membership {
                name: name.to_string(),
                reason: "peer name is empty".into(),
            });
        }
        let admitted = self.status.write().roster.admit(name);
        if admitted {
            info!(node = %self.name, peer = %name, "member admitted");
        }
        Ok(admitted)
    }
}

#[async_trait]
impl ConsensusEngine for RaftEngine {
    async fn start(&self) -> Result<(), EngineError> {
        let Some(inbox) = self.inbox.lock().take() else {
            return Ok(());
        };
        let mut worker = Worker::recover(self)?;
        worker.process_ready()?;
        worker.publish();
        tokio::spawn(worker.run(inbox));
        Ok(())
    }

    fn is_log_empty(&self) -> bool {
        self.status.read().last_index == 0
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        self.call(|respond_to| Request::Initialize { respond_to })
            .await
    }

    async fn execute(&self, command: Command) -> Result<CommitReceipt, EngineError> {
        command.validate()?;
        self.call(|respond_to| Request::Propose {
            command,
            respond_to,
        })
        .await
    }

    async fn request_vote(
        &self,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse, EngineError> {
        self.status.write().roster.learn(&request.candidate_name);
        let reply = self.step(codec::vote_message(&request, self.id)).await?;
        Ok(reply.vote())
    }

    async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, EngineError> {
        self.status.write().roster.learn(&request.leader_name);
        let reply = self.step(codec::append_message(&request, self.id)).await?;
        Ok(reply.append())
    }

    async fn snapshot_recovery(
        &self,
        request: SnapshotRequest,
    ) -> Result<SnapshotResponse, EngineError> {
        StateMachine::validate_snapshot(&request.state).map_err(EngineError::Snapshot)?;
        self.status.write().roster.learn(&request.leader_name);
        let reply = self.step(codec::snapshot_message(&request, self.id)).await?;
        Ok(reply.snapshot())
    }

    fn state(&self) -> Role {
        self.status.read().role
    }

    fn leader(&self) -> Option<String> {
        self.status.read().leader.clone()
    }

    fn peers(&self) -> Vec<String> {
        self.status.read().roster.members()
    }

    fn voters(&self) -> Vec<String> {
        self.status.read().voters.clone()
    }

    fn log_entries(&self) -> Vec<LogEntry> {
        self.status.read().log.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A proposal waiting for its entry to be applied.
struct Pending {
    term: u64,
    respond_to: Responder<CommitReceipt>,
}

/// Catches raft's answer to the inbound message being stepped so it goes
/// back as the HTTP response instead of a new outbound call.
struct Capture {
    peer: u64,
    kind: MessageType,
    message: Option<Message>,
    restored: bool,
}

struct Worker {
    id: u64,
    name: String,
    raw: RawNode<MemStorage>,
    storage: MemStorage,
    journal: Journal,
    store: Arc<StateMachine>,
    registry: Arc<CommandRegistry>,
    transport: Arc<dyn PeerTransport>,
    status: Arc<RwLock<Status>>,
    engine: Weak<RaftEngine>,
    outbox: mpsc::UnboundedSender<Request>,
    tick: Duration,
    logger: Logger,
    pending: BTreeMap<u64, Pending>,
    /// Voters raft already counts, by log or snapshot.
    recorded: BTreeSet<u64>,
    applied: u64,
    capture: Option<Capture>,
}

impl Worker {
    /// Replays the journal into a fresh storage and builds the raft node.
    fn recover(engine: &RaftEngine) -> Result<Self, EngineError> {
        let storage = MemStorage::new();
        let journal = Journal::new(&engine.data_dir);
        let recovered = journal.replay(&storage, &engine.store)?;
        {
            let mut status = engine.status.write();
            for name in &recovered.members {
                status.roster.admit(name);
            }
        }

        let logger = silent_logger();
        let raw = RawNode::new(
            &raft_config(engine.id, recovered.applied),
            storage.clone(),
            &logger,
        )?;
        info!(
            node = %engine.name,
            id = engine.id,
            journal = %journal.path().display(),
            records = recovered.records,
            applied = recovered.applied,
            "consensus state recovered"
        );
        Ok(Self {
            id: engine.id,
            name: engine.name.clone(),
            raw,
            storage,
            journal,
            store: engine.store.clone(),
            registry: engine.registry.clone(),
            transport: engine.transport.clone(),
            status: engine.status.clone(),
            engine: engine.me.clone(),
            outbox: engine.requests.clone(),
            tick: engine.tick,
            logger,
            pending: BTreeMap::new(),
            recorded: recovered.voters,
            applied: recovered.applied,
            capture: None,
        })
    }

    /// Runs until the engine is dropped or persisting fails. Proposals still
    /// waiting when it stops see [`EngineError::Stopped`].
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Request>) {
        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let handled = tokio::select! {
                request = inbox.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
                _ = ticker.tick() => {
                    if self.engine.strong_count() == 0 {
                        break;
                    }
                    self.raw.tick();
                    Ok(())
                }
            };
            if let Err(err) = handled.and_then(|()| self.drive()) {
                error!(node = %self.name, error = %err, "consensus worker stopped");
                break;
            }
        }
        let mut status = self.status.write();
        status.role = Role::Follower;
        status.leader = None;
        debug!(node = %self.name, "consensus worker exited");
    }

    fn drive(&mut self) -> Result<(), EngineError> {
        self.process_ready()?;
        self.reconcile_voters();
        self.process_ready()?;
        self.publish();
        Ok(())
    }

    fn handle(&mut self, request: Request) -> Result<(), EngineError> {
        match request {
            Request::Initialize { respond_to } => {
                let result = self.initialize();
                let driven = self.drive();
                let _ = respond_to.send(result);
                driven?;
            }
            Request::Propose {
                command,
                respond_to,
            } => self.propose(command, respond_to),
            Request::Step {
                message,
                respond_to,
            } => {
                let reply = self.step(message)?;
                self.publish();
                let _ = respond_to.send(Ok(reply));
            }
            Request::Deliver { reply, snapshot } => {
                let peer = reply.from;
                if let Err(err) = self.raw.step(reply) {
                    debug!(peer, error = %err, "peer reply dropped");
                }
                if snapshot {
                    self.raw.report_snapshot(peer, SnapshotStatus::Finish);
                }
            }
            Request::Unreachable { peer, snapshot } => {
                self.raw.report_unreachable(peer);
                if snapshot {
                    self.raw.report_snapshot(peer, SnapshotStatus::Failure);
                }
            }
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        let conf = self.storage.initial_state()?.conf_state;
        if !conf.voters.is_empty() || self.raw.raft.raft_log.last_index() > 0 {
            return Err(EngineError::AlreadyInitialized);
        }
        let conf = ConfState::from((vec![self.id], Vec::new()));
        self.journal.append(&[Record::conf_state(&conf)])?;
        self.storage.wl().set_conf_state(conf);
        self.raw = RawNode::new(
            &raft_config(self.id, self.applied),
            self.storage.clone(),
            &self.logger,
        )?;
        self.status.write().roster.admit(&self.name);
        self.raw.campaign()?;
        info!(node = %self.name, "formed a single-member cluster");
        Ok(())
    }

    fn propose(&mut self, command: Command, respond_to: Responder<CommitReceipt>) {
        if self.raw.raft.state != StateRole::Leader {
            let _ = respond_to.send(Err(EngineError::NotLeader {
                leader: self.leader_name(),
            }));
            return;
        }
        let data = match CommandEnvelope::new(&command).and_then(|envelope| protocol::encode(&envelope)) {
            Ok(data) => data,
            Err(err) => {
                let _ = respond_to.send(Err(EngineError::Encode(err)));
                return;
            }
        };
        match self.raw.propose(Vec::new(), data) {
            Ok(()) => {
                let index = self.raw.raft.raft_log.last_index();
                let term = self.raw.raft.term;
                debug!(index, term, command = command.name(), "proposed");
                self.pending.insert(index, Pending { term, respond_to });
            }
            Err(raft::Error::ProposalDropped) => {
                let _ = respond_to.send(Err(EngineError::NotLeader {
                    leader: self.leader_name(),
                }));
            }
            Err(err) => {
                let _ = respond_to.send(Err(err.into()));
            }
        }
    }

    fn step(&mut self, message: Message) -> Result<Reply, EngineError> {
        let peer = message.from;
        let Some(kind) = codec::reply_kind(message.msg_type()) else {
            return Ok(self.reply(None, false));
        };
        self.capture = Some(Capture {
            peer,
            kind,
            message: None,
            restored: false,
        });
        if let Err(err) = self.raw.step(message) {
            debug!(peer, error = %err, "inbound message not stepped");
        }
        let processed = self.process_ready();
        let capture = self.capture.take();
        processed?;
        let (answer, restored) = capture.map_or((None, false), |c| (c.message, c.restored));
        Ok(self.reply(answer, restored))
    }

    fn reply(&self, message: Option<Message>, restored: bool) -> Reply {
        let raft = &self.raw.raft;
        Reply {
            message,
            restored,
            term: raft.term,
            last_index: raft.raft_log.last_index(),
            commit: raft.raft_log.committed,
        }
    }

    /// Drains raft's pending work in the order its persistence contract
    /// needs: snapshot and entries reach the journal before anything that
    /// depends on them is applied or acknowledged.
    fn process_ready(&mut self) -> Result<(), EngineError> {
        while self.raw.has_ready() {
            let mut ready = self.raw.ready();
            self.dispatch(ready.take_messages());

            if !ready.snapshot().is_empty() {
                let snapshot = ready.snapshot().clone();
                self.install_snapshot(&snapshot)?;
            }

            let mut records = Vec::new();
            if !ready.entries().is_empty() {
                records.push(Record::entries(ready.entries()));
            }
            if let Some(state) = ready.hs() {
                records.push(Record::hard_state(state));
            }
            self.journal.append(&records)?;
            if !ready.entries().is_empty() {
                self.storage.wl().append(ready.entries())?;
            }
            if let Some(state) = ready.hs() {
                self.storage.wl().set_hardstate(state.clone());
            }

            self.apply(ready.take_committed_entries())?;
            self.dispatch(ready.take_persisted_messages());

            let mut light = self.raw.advance(ready);
            if let Some(commit) = light.commit_index() {
                let mut state = self.storage.initial_state()?.hard_state;
                state.commit = commit;
                self.journal.append(&[Record::hard_state(&state)])?;
                self.storage.wl().mut_hard_state().set_commit(commit);
            }
            self.dispatch(light.take_messages());
            self.apply(light.take_committed_entries())?;
            self.raw.advance_apply();
        }
        Ok(())
    }

    fn install_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), EngineError> {
        let metadata = snapshot.get_metadata();
        let index = metadata.index;
        self.journal.rewrite(&[Record::snapshot(snapshot)])?;
        self.storage.wl().apply_snapshot(snapshot.clone())?;
        let members = self.store.restore(&snapshot.data).map_err(EngineError::Snapshot)?;
        {
            let mut status = self.status.write();
            for name in &members {
                status.roster.admit(name);
            }
            status.log.clear();
        }
        self.recorded = metadata.get_conf_state().voters.iter().copied().collect();
        self.applied = index;

        let kept = self.pending.split_off(&(index + 1));
        let superseded = std::mem::replace(&mut self.pending, kept);
        let leader = self.leader_name();
        for pending in superseded.into_values() {
            let _ = pending.respond_to.send(Err(EngineError::NotLeader {
                leader: leader.clone(),
            }));
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.restored = true;
        }
        info!(node = %self.name, index, term = metadata.term, "snapshot installed");
        Ok(())
    }

    fn apply(&mut self, entries: Vec<Entry>) -> Result<(), EngineError> {
        for entry in entries {
            let outcome = match entry.entry_type() {
                EntryType::EntryNormal if entry.data.is_empty() => Ok(()),
                EntryType::EntryNormal => self.apply_command(&entry),
                EntryType::EntryConfChange => {
                    self.apply_conf_change(&entry)?;
                    Ok(())
                }
                EntryType::EntryConfChangeV2 => {
                    warn!(index = entry.index, "joint membership changes are not supported");
                    Ok(())
                }
            };
            self.applied = entry.index;
            self.settle(entry.index, entry.term, outcome);
        }
        Ok(())
    }

    fn apply_command(&self, entry: &Entry) -> Result<(), EngineError> {
        let envelope: CommandEnvelope = protocol::decode(&entry.data)?;
        let command = envelope.command(&self.registry)?;
        let engine = self.engine.upgrade().ok_or(EngineError::Stopped)?;
        let ctx = ApplyContext {
            store: &self.store,
            peers: engine.as_ref(),
        };
        let applied = command.apply(&ctx);
        self.status
            .write()
            .log
            .push(envelope.into_log_entry(entry.index, entry.term));
        if let Err(err) = applied {
            warn!(index = entry.index, command = command.name(), error = %err, "apply failed");
            return Err(err.into());
        }
        debug!(index = entry.index, command = command.name(), "applied");
        Ok(())
    }

    /// Only a journal failure is an error; a change raft refuses is logged.
    fn apply_conf_change(&mut self, entry: &Entry) -> Result<(), EngineError> {
        let change = match ConfChange::decode(&entry.data[..]) {
            Ok(change) => change,
            Err(err) => {
                warn!(index = entry.index, error = %err, "undecodable membership change");
                return Ok(());
            }
        };
        let conf = match self.raw.apply_conf_change(&change) {
            Ok(conf) => conf,
            Err(err) => {
                warn!(index = entry.index, error = %err, "membership change refused");
                return Ok(());
            }
        };
        self.journal.append(&[Record::conf_state(&conf)])?;
        self.storage.wl().set_conf_state(conf);
        self.recorded.insert(change.node_id);
        let name = String::from_utf8_lossy(&change.context).into_owned();
        if !name.is_empty() {
            self.status.write().roster.admit(&name);
        }
        info!(node = %self.name, peer = %name, index = entry.index, "voter added");
        Ok(())
    }

    fn settle(&mut self, index: u64, term: u64, outcome: Result<(), EngineError>) {
        let Some(pending) = self.pending.remove(&index) else {
            return;
        };
        let result = if pending.term == term {
            outcome.map(|()| CommitReceipt { index, term })
        } else {
            Err(EngineError::NotLeader {
                leader: self.leader_name(),
            })
        };
        let _ = pending.respond_to.send(result);
    }

    /// Proposes a voter change for one admitted member raft does not count
    /// yet. One change is in flight at a time.
    fn reconcile_voters(&mut self) {
        let raft = &self.raw.raft;
        if raft.state != StateRole::Leader || self.applied < raft.raft_log.last_index() {
            return;
        }
        let missing = {
            let status = self.status.read();
            let missing = status
                .roster
                .member_ids()
                .filter(|id| !self.recorded.contains(id))
                .find_map(|id| status.roster.name(id).map(|name| (id, name.to_string())));
            missing
        };
        let Some((id, name)) = missing else {
            return;
        };

        let mut change = ConfChange::default();
        change.set_change_type(ConfChangeType::AddNode);
        change.node_id = id;
        change.context = name.clone().into_bytes().into();
        match self.raw.propose_conf_change(Vec::new(), change) {
            Ok(()) => debug!(node = %self.name, peer = %name, "proposing voter"),
            Err(err) => warn!(node = %self.name, peer = %name, error = %err, "voter proposal failed"),
        }
    }

    fn dispatch(&mut self, messages: Vec<Message>) {
        for message in messages {
            if let Some(capture) = self.capture.as_mut() {
                if capture.message.is_none()
                    && message.to == capture.peer
                    && message.msg_type() == capture.kind
                {
                    capture.message = Some(message);
                    continue;
                }
            }
            self.send(message);
        }
    }

    fn send(&mut self, mut message: Message) {
        let to = message.to;
        let peer = self.status.read().roster.name(to).map(str::to_owned);
        let Some(peer) = peer else {
            debug!(to, kind = ?message.msg_type(), "no address for peer");
            self.raw.report_unreachable(to);
            return;
        };
        if message.msg_type() == MessageType::MsgSnapshot {
            if let Err(err) = self.fill_snapshot(&mut message) {
                warn!(%peer, error = %err, "unable to build snapshot");
                self.raw.report_snapshot(to, SnapshotStatus::Failure);
                return;
            }
        }
        let Some(outbound) = Outbound::from_message(&message, &self.name) else {
            debug!(%peer, kind = ?message.msg_type(), "message has no wire form");
            return;
        };

        let transport = self.transport.clone();
        let outbox = self.outbox.clone();
        let me = self.id;
        tokio::spawn(async move {
            let snapshot = outbound.is_snapshot();
            let request = match outbound.exchange(transport.as_ref(), &peer, to, me).await {
                Ok(reply) => Request::Deliver { reply, snapshot },
                Err(err) => {
                    debug!(%peer, error = %err, "peer call failed");
                    Request::Unreachable { peer: to, snapshot }
                }
            };
            let _ = outbox.send(request);
        });
    }

    /// Raft asks for a snapshot without its data; the state machine image is
    /// taken here, at the applied index.
    fn fill_snapshot(&self, message: &mut Message) -> Result<(), EngineError> {
        let members = self.status.read().roster.members();
        let state = self.store.snapshot(members).map_err(EngineError::Snapshot)?;
        let term = self.raw.raft.raft_log.term(self.applied)?;
        let conf = self.storage.initial_state()?.conf_state;
        let snapshot = message.mut_snapshot();
        snapshot.data = state.into();
        let metadata = snapshot.mut_metadata();
        metadata.index = self.applied;
        metadata.term = term;
        metadata.set_conf_state(conf);
        Ok(())
    }

    fn leader_name(&self) -> Option<String> {
        let leader = self.raw.raft.leader_id;
        if leader == INVALID_ID {
            return None;
        }
        self.status.read().roster.name(leader).map(str::to_owned)
    }

    fn publish(&self) {
        let raft = &self.raw.raft;
        let role = match raft.state {
            StateRole::Leader => Role::Leader,
            StateRole::Candidate | StateRole::PreCandidate => Role::Candidate,
            StateRole::Follower => Role::Follower,
        };
        let leader = self.leader_name();
        let mut status = self.status.write();
        if role != status.role || leader != status.leader {
            info!(
                node = %self.name,
                %role,
                term = raft.term,
                leader = leader.as_deref().unwrap_or("-"),
                "role changed"
            );
        }
        let mut voters: Vec<String> = self
            .recorded
            .iter()
            .filter_map(|id| status.roster.name(*id).map(str::to_owned))
            .collect();
        voters.sort();
        status.role = role;
        status.leader = leader;
        status.voters = voters;
        status.last_index = raft.raft_log.last_index();
    }
}
