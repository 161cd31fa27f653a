//! The replicated state machine.
//!
//! Committed commands land here: a key/value map for `write` and a directory
//! of opaque files for `file:write`. Readers are public; every mutation is
//! crate-private so that only command application and snapshot restore can
//! change state.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::protocol::base64_bytes;

/// Directory under the data directory that holds replicated files.
pub const FILES_DIR: &str = "files";

/// Key/value and file state shared by every handler of a node.
///
/// One lock covers both halves: writers take it exclusively for the length of
/// a single mutation, readers share it.
pub struct StateMachine {
    data: RwLock<BTreeMap<String, String>>,
    files_dir: PathBuf,
}

/// The snapshot blob: replicated state plus the peer names that were cluster
/// members when it was taken.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotImage {
    entries: BTreeMap<String, String>,
    files: BTreeMap<String, FileImage>,
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct FileImage(#[serde(with = "base64_bytes")] Vec<u8>);

impl StateMachine {
    /// Opens the state machine rooted at `data_dir`, creating the file area.
    pub fn open(data_dir: &Path) -> io::Result<Self> {
        let files_dir = data_dir.join(FILES_DIR);
        fs::create_dir_all(&files_dir)?;
        Ok(Self {
            data: RwLock::new(BTreeMap::new()),
            files_dir,
        })
    }

    /// Returns the applied value for `key` on this node.
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// Copies every applied key/value pair.
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.data.read().clone()
    }

    /// Reads a replicated file, `None` when it was never written.
    pub fn read_file(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let _guard = self.data.read();
        match fs::read(self.files_dir.join(name)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub(crate) fn put(&self, key: String, value: String) {
        self.data.write().insert(key, value);
    }

    pub(crate) fn write_file(&self, name: &str, content: &[u8]) -> io::Result<PathBuf> {
        let path = self.files_dir.join(name);
        let _guard = self.data.write();
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Serializes the full state, together with `members`, into an opaque
    /// blob for snapshot transfer.
    pub(crate) fn snapshot(&self, members: Vec<String>) -> io::Result<Vec<u8>> {
        let guard = self.data.read();
        let mut files = BTreeMap::new();
        for dir_entry in fs::read_dir(&self.files_dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            files.insert(name, FileImage(fs::read(dir_entry.path())?));
        }
        let image = SnapshotImage {
            entries: guard.clone(),
            files,
            members,
        };
        serde_json::to_vec(&image).map_err(to_io_error)
    }

    /// Checks that `blob` is a snapshot this node could restore.
    pub(crate) fn validate_snapshot(blob: &[u8]) -> io::Result<()> {
        serde_json::from_slice::<SnapshotImage>(blob)
            .map(|_| ())
            .map_err(to_io_error)
    }

    /// Makes local state exactly the blob's: the key/value map is replaced,
    /// files are rewritten and files the image does not hold are removed.
    /// Returns the member names the image carried.
    pub(crate) fn restore(&self, blob: &[u8]) -> io::Result<Vec<String>> {
        let image: SnapshotImage = serde_json::from_slice(blob).map_err(to_io_error)?;
        let mut guard = self.data.write();
        for dir_entry in fs::read_dir(&self.files_dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if dir_entry.file_type()?.is_file() && !image.files.contains_key(&name) {
                fs::remove_file(dir_entry.path())?;
            }
        }
        for (name, FileImage(content)) in &image.files {
            fs::write(self.files_dir.join(name), content)?;
        }
        *guard = image.entries;
        Ok(image.members)
    }
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
