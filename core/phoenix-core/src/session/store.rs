//! Per-session event log and metadata persistence.
//!
//! Each session directory holds two JSON files that are loaded, amended and
//! rewritten whole on every hook invocation:
//!
//! - `session_events.json`: JSON array of event records, append order.
//! - `session_metadata.json`: status, metrics, agent roster and a copy of
//!   the events.
//!
//! # Concurrency
//!
//! Load-modify-rewrite loses updates if two writers overlap, so every write
//! holds an exclusive advisory lock on `<dir>/.session.lock` for the whole
//! cycle (see [`super::lock`]). Files are replaced via temp file + rename.
//! The upgrade path to drop the lock entirely is one file per event merged on
//! read; the public API here would not change.
//!
//! # Tolerant Reads
//!
//! - Missing, empty or corrupt event log: treated as empty.
//! - Legacy `{"session_id": .., "events": [..]}` log: its `events` are used.
//! - Records that no longer parse are skipped by readers but preserved on rewrite.

use std::io::Write;
use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{PhoenixError, Result};
use crate::storage::{events_file, metadata_file};

use super::lock::FileLock;
use super::types::{EventRecord, SessionMetadata};

const LOCK_FILE_NAME: &str = ".session.lock";

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn events_path(&self) -> PathBuf {
        events_file(&self.dir)
    }

    pub fn metadata_path(&self) -> PathBuf {
        metadata_file(&self.dir)
    }

    fn lock(&self) -> Result<FileLock> {
        let path = self.dir.join(LOCK_FILE_NAME);
        FileLock::acquire(&path)
            .map_err(|e| PhoenixError::io(format!("locking {}", path.display()), e))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event log
    // ─────────────────────────────────────────────────────────────────────

    /// Typed events in insertion order. Never fails.
    pub fn read_events(&self) -> Vec<EventRecord> {
        load_raw_events(&self.events_path())
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect()
    }

    /// Appends one record to the event log.
    pub fn append(&self, record: &EventRecord) -> Result<()> {
        let _guard = self.lock()?;
        self.append_locked(record)
    }

    fn append_locked(&self, record: &EventRecord) -> Result<()> {
        let path = self.events_path();
        let mut events = load_raw_events(&path);
        events.push(
            serde_json::to_value(record).map_err(|e| PhoenixError::json("serializing event", e))?,
        );
        write_json_atomic(&path, &events)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────

    /// Returns `None` when the metadata file is missing or unreadable.
    pub fn read_metadata(&self) -> Option<SessionMetadata> {
        read_metadata_file(&self.metadata_path())
    }

    /// Creates or replaces the metadata file.
    pub fn write_metadata(&self, metadata: &SessionMetadata) -> Result<()> {
        let _guard = self.lock()?;
        write_json_atomic(&self.metadata_path(), metadata)
    }

    /// Applies `update` to the metadata under the session lock.
    pub fn update_metadata<T, F>(&self, update: F) -> Result<T>
    where
        F: FnOnce(&mut SessionMetadata) -> T,
    {
        let _guard = self.lock()?;
        self.update_metadata_locked(update)
    }

    fn update_metadata_locked<T, F>(&self, update: F) -> Result<T>
    where
        F: FnOnce(&mut SessionMetadata) -> T,
    {
        let path = self.metadata_path();
        let mut metadata =
            read_metadata_file(&path).ok_or_else(|| PhoenixError::MetadataMissing(path.clone()))?;
        let out = update(&mut metadata);
        write_json_atomic(&path, &metadata)?;
        Ok(out)
    }

    /// Appends `record` to the event log and to the metadata's event list,
    /// then applies `update`, all under one lock acquisition.
    ///
    /// The event log write happens first; a missing metadata file is an
    /// error only after the log has been amended.
    pub fn record<T, F>(&self, record: &EventRecord, update: F) -> Result<T>
    where
        F: FnOnce(&mut SessionMetadata) -> T,
    {
        let _guard = self.lock()?;
        self.record_locked(record, update)
    }

    /// Like [`record`](Self::record), but only when `guard` accepts the
    /// current metadata. The check and the write share one lock acquisition.
    /// Returns `None` when the guard rejected.
    pub fn record_if<T, G, F>(&self, record: &EventRecord, guard: G, update: F) -> Result<Option<T>>
    where
        G: FnOnce(&SessionMetadata) -> bool,
        F: FnOnce(&mut SessionMetadata) -> T,
    {
        let _guard = self.lock()?;
        let path = self.metadata_path();
        let metadata =
            read_metadata_file(&path).ok_or_else(|| PhoenixError::MetadataMissing(path.clone()))?;
        if !guard(&metadata) {
            return Ok(None);
        }
        self.record_locked(record, update).map(Some)
    }

    fn record_locked<T, F>(&self, record: &EventRecord, update: F) -> Result<T>
    where
        F: FnOnce(&mut SessionMetadata) -> T,
    {
        self.append_locked(record)?;
        self.update_metadata_locked(|metadata| {
            metadata.metrics.hook_triggers += 1;
            metadata.events.push(record.clone());
            update(metadata)
        })
    }
}

fn load_raw_events(path: &Path) -> Vec<Value> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    if content.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(mut map)) => match map.remove("events") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Ok(_) => Vec::new(),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Corrupt event log, treating as empty"
            );
            Vec::new()
        }
    }
}

fn read_metadata_file(path: &Path) -> Option<SessionMetadata> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable session metadata");
            None
        }
    }
}

/// Serializes to a temp file in the target directory and renames it over `path`.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content =
        serde_json::to_string_pretty(value).map_err(|e| PhoenixError::json("serializing", e))?;
    let parent = path
        .parent()
        .ok_or_else(|| PhoenixError::io(
            format!("{} has no parent directory", path.display()),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ))?;
    fs::create_dir_all(parent)
        .map_err(|e| PhoenixError::io(format!("creating {}", parent.display()), e))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .map_err(|e| PhoenixError::io("creating temp file", e))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| PhoenixError::io("writing temp file", e))?;
    temp_file
        .flush()
        .map_err(|e| PhoenixError::io("flushing temp file", e))?;
    temp_file
        .persist(path)
        .map_err(|e| PhoenixError::io(format!("replacing {}", path.display()), e.error))?;
    Ok(())
}
