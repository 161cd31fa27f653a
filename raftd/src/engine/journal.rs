//! Durable record of the consensus log at `<data>/log`.
//!
//! Raft keeps its log in a `MemStorage`. Every mutation the engine makes to
//! that storage is first appended here as one JSON line, and only then applied
//! in memory, so a restarted node replays the journal into a fresh storage and
//! resumes from where it stopped. Installing a snapshot rewrites the journal
//! from scratch, since everything before the snapshot is covered by it.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use raft::prelude::{ConfState, Entry, HardState, Snapshot};
use raft::storage::MemStorage;
use raft::Storage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::codec::{entry_from_wire, entry_to_wire};
use crate::error::EngineError;
use crate::protocol::{base64_bytes, ReplicatedEntry};
use crate::store::StateMachine;

/// File name of the journal under the data directory.
pub const JOURNAL_FILE: &str = "log";

/// One storage mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    HardState {
        term: u64,
        vote: u64,
        commit: u64,
    },
    ConfState {
        voters: Vec<u64>,
        learners: Vec<u64>,
    },
    Entries {
        entries: Vec<ReplicatedEntry>,
    },
    Snapshot {
        index: u64,
        term: u64,
        voters: Vec<u64>,
        learners: Vec<u64>,
        #[serde(with = "base64_bytes")]
        state: Vec<u8>,
    },
}

impl Record {
    pub fn hard_state(state: &HardState) -> Self {
        Record::HardState {
            term: state.term,
            vote: state.vote,
            commit: state.commit,
        }
    }

    pub fn conf_state(conf: &ConfState) -> Self {
        Record::ConfState {
            voters: conf.voters.clone(),
            learners: conf.learners.clone(),
        }
    }

    pub fn entries(entries: &[Entry]) -> Self {
        Record::Entries {
            entries: entries.iter().map(entry_to_wire).collect(),
        }
    }

    pub fn snapshot(snapshot: &Snapshot) -> Self {
        let metadata = snapshot.get_metadata();
        let conf = metadata.get_conf_state();
        Record::Snapshot {
            index: metadata.index,
            term: metadata.term,
            voters: conf.voters.clone(),
            learners: conf.learners.clone(),
            state: snapshot.data.to_vec(),
        }
    }
}

/// What replaying a journal leaves behind besides the filled storage.
#[derive(Debug, Default)]
pub struct Recovered {
    /// Index the state machine already reflects: the last snapshot's.
    pub applied: u64,
    /// Voters named by the last snapshot.
    pub voters: BTreeSet<u64>,
    /// Member names the last snapshot carried.
    pub members: Vec<String>,
    pub records: usize,
}

/// Append-only JSON-lines file of [`Record`]s.
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(JOURNAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `records` with one write and waits for them to reach the disk.
    pub fn append(&self, records: &[Record]) -> io::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let lines = encode_lines(records)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&lines)?;
        file.sync_data()
    }

    /// Replaces the whole journal with `records`.
    pub fn rewrite(&self, records: &[Record]) -> io::Result<()> {
        let lines = encode_lines(records)?;
        let staging = self.path.with_extension("new");
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(&lines)?;
            file.sync_data()?;
        }
        fs::rename(&staging, &self.path)
    }

    /// Reads every record. A missing file is an empty journal, and a final
    /// line cut short by a crash mid-append is dropped.
    pub fn load(&self) -> io::Result<Vec<Record>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
        let mut records = Vec::with_capacity(lines.len());
        for (number, line) in lines.iter().enumerate() {
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(err) if number + 1 == lines.len() => {
                    warn!(path = %self.path.display(), error = %err, "dropping torn journal tail");
                }
                Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
            }
        }
        Ok(records)
    }

    /// Rebuilds `storage` and the state machine's snapshot base from the
    /// journal. Entries after the snapshot are left for raft to re-apply.
    pub fn replay(
        &self,
        storage: &MemStorage,
        store: &StateMachine,
    ) -> Result<Recovered, EngineError> {
        let records = self.load()?;
        let mut recovered = Recovered {
            records: records.len(),
            ..Recovered::default()
        };
        for record in records {
            match record {
                Record::HardState { term, vote, commit } => {
                    let mut state = HardState::default();
                    state.term = term;
                    state.vote = vote;
                    state.commit = commit;
                    storage.wl().set_hardstate(state);
                }
                Record::ConfState { voters, learners } => {
                    storage.wl().set_conf_state(ConfState::from((voters, learners)));
                }
                Record::Entries { entries } => {
                    let entries: Vec<Entry> = entries.iter().map(entry_from_wire).collect();
                    append_contiguous(storage, &entries)?;
                }
                Record::Snapshot {
                    index,
                    term,
                    voters,
                    learners,
                    state,
                } => {
                    let mut snapshot = Snapshot::default();
                    let metadata = snapshot.mut_metadata();
                    metadata.index = index;
                    metadata.term = term;
                    metadata.set_conf_state(ConfState::from((voters.clone(), learners)));
                    recovered.members = store.restore(&state).map_err(EngineError::Snapshot)?;
                    snapshot.data = state.into();
                    storage.wl().apply_snapshot(snapshot)?;
                    recovered.applied = index;
                    recovered.voters = voters.into_iter().collect();
                }
            }
        }
        debug!(path = %self.path.display(), records = recovered.records, "journal replayed");
        Ok(recovered)
    }
}

/// `MemStorage` panics on a gap or on overwriting compacted entries; a
/// damaged journal is reported instead.
fn append_contiguous(storage: &MemStorage, entries: &[Entry]) -> Result<(), EngineError> {
    let Some(first) = entries.first() else {
        return Ok(());
    };
    let first_index = storage.first_index()?;
    let last_index = storage.last_index()?;
    if first.index < first_index || first.index > last_index + 1 {
        return Err(EngineError::Journal(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "journal entries start at {} but the log holds {first_index}..={last_index}",
                first.index
            ),
        )));
    }
    storage.wl().append(entries)?;
    Ok(())
}

fn encode_lines(records: &[Record]) -> io::Result<Vec<u8>> {
    let mut lines = Vec::new();
    for record in records {
        serde_json::to_writer(&mut lines, record)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        lines.push(b'\n');
    }
    Ok(lines)
}
