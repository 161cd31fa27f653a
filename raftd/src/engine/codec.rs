//! Translation between raft `Message`s and the JSON wire messages.
//!
//! Raft addresses peers by numeric id and speaks one message type; peers talk
//! to each other with the named requests of [`crate::protocol`]. Each
//! outbound message raft emits maps onto one wire request, and each wire
//! reply maps back onto the message raft expects in return. On the receiving
//! side the request becomes a message to step, and whatever raft answers is
//! captured and turned into the wire response.

use raft::prelude::{ConfState, Entry, EntryType, Message, MessageType};

use crate::error::TransportError;
use crate::peer::peer_id;
use crate::protocol::{
    AppendEntriesRequest, AppendEntriesResponse, EntryKind, ReplicatedEntry,
    RequestVoteRequest, RequestVoteResponse, SnapshotRequest, SnapshotResponse,
};
use crate::transport::PeerTransport;

pub(crate) fn entry_to_wire(entry: &Entry) -> ReplicatedEntry {
    let kind = match entry.entry_type() {
        EntryType::EntryNormal => EntryKind::Normal,
        EntryType::EntryConfChange => EntryKind::ConfChange,
        EntryType::EntryConfChangeV2 => EntryKind::ConfChangeV2,
    };
    ReplicatedEntry {
        index: entry.index,
        term: entry.term,
        kind,
        data: entry.data.to_vec(),
        context: entry.context.to_vec(),
    }
}

pub(crate) fn entry_from_wire(wire: &ReplicatedEntry) -> Entry {
    let mut entry = Entry::default();
    entry.set_entry_type(match wire.kind {
        EntryKind::Normal => EntryType::EntryNormal,
        EntryKind::ConfChange => EntryType::EntryConfChange,
        EntryKind::ConfChangeV2 => EntryType::EntryConfChangeV2,
    });
    entry.index = wire.index;
    entry.term = wire.term;
    entry.data = wire.data.clone().into();
    entry.context = wire.context.clone().into();
    entry
}

fn message(kind: MessageType, from: u64, to: u64, term: u64) -> Message {
    let mut message = Message::default();
    message.set_msg_type(kind);
    message.from = from;
    message.to = to;
    message.term = term;
    message
}

/// The message type raft answers `kind` with.
pub(crate) fn reply_kind(kind: MessageType) -> Option<MessageType> {
    match kind {
        MessageType::MsgRequestVote => Some(MessageType::MsgRequestVoteResponse),
        MessageType::MsgAppend | MessageType::MsgSnapshot => Some(MessageType::MsgAppendResponse),
        MessageType::MsgHeartbeat => Some(MessageType::MsgHeartbeatResponse),
        _ => None,
    }
}

/// A wire request built from a message raft wants delivered.
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    Vote(RequestVoteRequest),
    Append(AppendEntriesRequest),
    Snapshot(SnapshotRequest),
}

impl Outbound {
    /// `None` for message kinds that only ever travel as replies.
    pub(crate) fn from_message(message: &Message, me: &str) -> Option<Self> {
        let outbound = match message.msg_type() {
            MessageType::MsgRequestVote => Outbound::Vote(RequestVoteRequest {
                term: message.term,
                last_log_index: message.index,
                last_log_term: message.log_term,
                candidate_name: me.to_string(),
            }),
            MessageType::MsgAppend => Outbound::Append(AppendEntriesRequest {
                term: message.term,
                prev_log_index: message.index,
                prev_log_term: message.log_term,
                commit_index: message.commit,
                leader_name: me.to_string(),
                heartbeat: false,
                entries: message.entries.iter().map(entry_to_wire).collect(),
            }),
            MessageType::MsgHeartbeat => Outbound::Append(AppendEntriesRequest {
                term: message.term,
                prev_log_index: 0,
                prev_log_term: 0,
                commit_index: message.commit,
                leader_name: me.to_string(),
                heartbeat: true,
                entries: Vec::new(),
            }),
            MessageType::MsgSnapshot => {
                let snapshot = message.get_snapshot();
                let metadata = snapshot.get_metadata();
                Outbound::Snapshot(SnapshotRequest {
                    term: message.term,
                    leader_name: me.to_string(),
                    last_index: metadata.index,
                    last_term: metadata.term,
                    voters: metadata.get_conf_state().voters.clone(),
                    state: snapshot.data.to_vec(),
                })
            }
            _ => return None,
        };
        Some(outbound)
    }

    pub(crate) fn is_snapshot(&self) -> bool {
        matches!(self, Outbound::Snapshot(_))
    }

    /// Delivers the request to `peer` and turns its reply into the message
    /// raft expects back. `peer_id` is the receiver's id, `me` the sender's.
    pub(crate) async fn exchange(
        &self,
        transport: &dyn PeerTransport,
        peer: &str,
        peer_id: u64,
        me: u64,
    ) -> Result<Message, TransportError> {
        match self {
            Outbound::Vote(request) => {
                let response = transport.send_vote_request(peer, request).await?;
                let mut reply = message(MessageType::MsgRequestVoteResponse, peer_id, me, response.term);
                reply.reject = !response.vote_granted;
                Ok(reply)
            }
            Outbound::Append(request) if request.heartbeat => {
                let response = transport.send_append_entries(peer, request).await?;
                let mut reply = message(MessageType::MsgHeartbeatResponse, peer_id, me, response.term);
                reply.commit = response.commit_index;
                Ok(reply)
            }
            Outbound::Append(request) => {
                let response = transport.send_append_entries(peer, request).await?;
                let mut reply = message(MessageType::MsgAppendResponse, peer_id, me, response.term);
                reply.commit = response.commit_index;
                if response.success {
                    reply.index = response.index;
                } else {
                    reply.reject = true;
                    reply.index = request.prev_log_index;
                    reply.reject_hint = response.index;
                }
                Ok(reply)
            }
            Outbound::Snapshot(request) => {
                let response = transport.send_snapshot(peer, request).await?;
                let mut reply = message(MessageType::MsgAppendResponse, peer_id, me, response.term);
                reply.index = response.commit_index;
                reply.commit = response.commit_index;
                Ok(reply)
            }
        }
    }
}

pub(crate) fn vote_message(request: &RequestVoteRequest, me: u64) -> Message {
    let mut vote = message(
        MessageType::MsgRequestVote,
        peer_id(&request.candidate_name),
        me,
        request.term,
    );
    vote.index = request.last_log_index;
    vote.log_term = request.last_log_term;
    vote
}

pub(crate) fn append_message(request: &AppendEntriesRequest, me: u64) -> Message {
    let from = peer_id(&request.leader_name);
    if request.heartbeat {
        let mut heartbeat = message(MessageType::MsgHeartbeat, from, me, request.term);
        heartbeat.commit = request.commit_index;
        return heartbeat;
    }
    let mut append = message(MessageType::MsgAppend, from, me, request.term);
    append.index = request.prev_log_index;
    append.log_term = request.prev_log_term;
    append.commit = request.commit_index;
    append.entries = request
        .entries
        .iter()
        .map(entry_from_wire)
        .collect::<Vec<_>>()
        .into();
    append
}

pub(crate) fn snapshot_message(request: &SnapshotRequest, me: u64) -> Message {
    let mut install = message(
        MessageType::MsgSnapshot,
        peer_id(&request.leader_name),
        me,
        request.term,
    );
    let snapshot = install.mut_snapshot();
    snapshot.data = request.state.clone().into();
    let metadata = snapshot.mut_metadata();
    metadata.index = request.last_index;
    metadata.term = request.last_term;
    metadata.set_conf_state(ConfState::from((request.voters.clone(), Vec::new())));
    install
}

/// What stepping one inbound message produced, read back by the handler that
/// submitted it.
#[derive(Debug, Default)]
pub(crate) struct Reply {
    /// Raft's answer to the sender, absent when it ignored the message.
    pub message: Option<Message>,
    /// A snapshot was installed while stepping.
    pub restored: bool,
    pub term: u64,
    pub last_index: u64,
    pub commit: u64,
}

impl Reply {
    pub(crate) fn vote(&self) -> RequestVoteResponse {
        match &self.message {
            Some(answer) => RequestVoteResponse {
                term: answer.term,
                vote_granted: !answer.reject,
            },
            None => RequestVoteResponse {
                term: self.term,
                vote_granted: false,
            },
        }
    }

    pub(crate) fn append(&self) -> AppendEntriesResponse {
        match &self.message {
            Some(answer) if answer.msg_type() == MessageType::MsgHeartbeatResponse => {
                AppendEntriesResponse {
                    term: answer.term,
                    index: self.last_index,
                    commit_index: self.commit,
                    success: true,
                }
            }
            Some(answer) => AppendEntriesResponse {
                term: answer.term,
                index: if answer.reject {
                    answer.reject_hint
                } else {
                    answer.index
                },
                commit_index: self.commit,
                success: !answer.reject,
            },
            None => AppendEntriesResponse {
                term: self.term,
                index: self.last_index,
                commit_index: self.commit,
                success: false,
            },
        }
    }

    pub(crate) fn snapshot(&self) -> SnapshotResponse {
        SnapshotResponse {
            term: self.message.as_ref().map_or(self.term, |answer| answer.term),
            commit_index: self.commit,
            success: self.restored,
        }
    }
}
