//! Project-wide index of sessions at `logs/session_registry.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::error::{PhoenixError, Result};
use crate::storage::ProjectLayout;

use super::lock::FileLock;
use super::store::write_json_atomic;
use super::types::SessionStatus;

const LOCK_FILE_NAME: &str = ".registry.lock";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub sessions: Vec<RegistryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub session_id: String,
    pub start_time: DateTime<Local>,
    #[serde(default)]
    pub source: Option<String>,
    pub status: SessionStatus,
    pub report_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    path: PathBuf,
    lock_path: PathBuf,
}

impl SessionRegistry {
    pub fn new(layout: &ProjectLayout) -> Self {
        Self {
            path: layout.registry_file(),
            lock_path: layout.logs_dir().join(LOCK_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or corrupt registry reads as empty.
    pub fn load(&self) -> RegistryFile {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return RegistryFile::default();
        };
        match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(error = %e, "Corrupt session registry, starting fresh");
                RegistryFile::default()
            }
        }
    }

    /// Inserts `entry`, replacing any previous entry for the same session.
    pub fn upsert(&self, entry: RegistryEntry) -> Result<()> {
        self.modify(|file| {
            file.sessions.retain(|s| s.session_id != entry.session_id);
            file.sessions.push(entry);
        })
    }

    /// Returns false when the session is not in the registry.
    pub fn mark_completed(
        &self,
        session_id: &str,
        end_time: DateTime<Local>,
        duration: &str,
    ) -> Result<bool> {
        let mut found = false;
        self.modify(|file| {
            if let Some(entry) = file
                .sessions
                .iter_mut()
                .find(|s| s.session_id == session_id)
            {
                entry.status = SessionStatus::Completed;
                entry.end_time = Some(end_time);
                entry.duration = Some(duration.to_string());
                found = true;
            }
        })?;
        Ok(found)
    }

    fn modify<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut RegistryFile),
    {
        let _guard = FileLock::acquire(&self.lock_path).map_err(|e| {
            PhoenixError::io(format!("locking {}", self.lock_path.display()), e)
        })?;
        let mut file = self.load();
        update(&mut file);
        write_json_atomic(&self.path, &file)
    }
}
