#![deny(warnings)]
#![deny(clippy::all)]

//! A digest store is a single JSON document recording, for every `(target, input)` pair seen on
//! a prior successful build, the input's digest and the mtime at which that digest was computed.
//! The freshness oracle's hash policy consults it to decide whether a target's inputs have
//! changed; the mtime lets it skip re-reading a file's bytes when the mtime has not moved since
//! the digest was recorded.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use kiln_hashing::Digest;
use serde::{Deserialize, Serialize};

/// The name of the per-working-directory digest store file.
pub const DEFAULT_FILE_NAME: &str = ".kiln-digests.json";

#[derive(Debug)]
pub enum DigestStoreError {
    Io { path: PathBuf, source: std::io::Error },
    Decode { path: PathBuf, message: String },
}

impl fmt::Display for DigestStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestStoreError::Io { path, source } => {
                write!(f, "{}: {source}", path.display())
            }
            DigestStoreError::Decode { path, message } => {
                write!(f, "{}: {message}", path.display())
            }
        }
    }
}

impl Error for DigestStoreError {}

/// A single recorded `(digest, mtime)` observation for one input of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub digest: Digest,
    pub mtime_secs: u64,
}

/// The on-disk shape. Plain struct deserialization (no `deny_unknown_fields`) means a store
/// written by a newer version of this crate with extra fields still loads here.
#[derive(Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    records: HashMap<String, Record>,
}

/// The in-memory digest store, loaded from and flushed back to a single JSON file.
pub struct DigestStore {
    path: PathBuf,
    records: HashMap<String, Record>,
    dirty: bool,
}

impl DigestStore {
    /// The default store path for a working directory: `<working_dir>/.kiln-digests.json`.
    pub fn default_path(working_dir: &Path) -> PathBuf {
        working_dir.join(DEFAULT_FILE_NAME)
    }

    /// Loads the store at `path`, or starts empty if the file does not exist yet.
    pub fn load(path: PathBuf) -> Result<DigestStore, DigestStoreError> {
        let records = match fs::read_to_string(&path) {
            Ok(contents) => {
                let file: StoreFile =
                    serde_json::from_str(&contents).map_err(|e| DigestStoreError::Decode {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                file.records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(DigestStoreError::Io {
                    path: path.clone(),
                    source: e,
                })
            }
        };
        Ok(DigestStore {
            path,
            records,
            dirty: false,
        })
    }

    /// Writes the store back to disk if anything has changed since it was loaded (or created).
    pub fn save(&mut self) -> Result<(), DigestStoreError> {
        if !self.dirty {
            return Ok(());
        }
        let file = StoreFile {
            records: self.records.clone(),
        };
        let contents = serde_json::to_string_pretty(&file).expect("serializing a digest store cannot fail");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DigestStoreError::Io {
                    path: self.path.clone(),
                    source: e,
                })?;
            }
        }
        fs::write(&self.path, contents).map_err(|e| DigestStoreError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        self.dirty = false;
        Ok(())
    }

    fn key(target: &str, input: &str) -> String {
        format!("{target}\u{0}{input}")
    }

    /// The record from the last successful build of `target` for its `input`, if any.
    pub fn get(&self, target: &str, input: &str) -> Option<&Record> {
        self.records.get(&Self::key(target, input))
    }

    /// Records `input`'s digest and mtime for `target`, overwriting any prior record.
    pub fn set(&mut self, target: &str, input: &str, record: Record) {
        self.records.insert(Self::key(target, input), record);
        self.dirty = true;
    }

    /// Drops every record for `target`, regardless of input. Used by `clean --digests`.
    pub fn clear_target(&mut self, target: &str) {
        let prefix = format!("{target}\u{0}");
        let before = self.records.len();
        self.records.retain(|k, _| !k.starts_with(&prefix));
        if self.records.len() != before {
            self.dirty = true;
        }
    }

    /// Drops every record. Used by `clean --digests` with no target filter.
    pub fn clear_all(&mut self) {
        if !self.records.is_empty() {
            self.records.clear();
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
