//! Session directory resolution.
//!
//! Maps a host-assigned session id onto its directory under `logs/`. Two naming
//! schemes exist side by side:
//!
//! - `session_<YYYYmmdd_HHMMSS>_<id>` (current, sorts chronologically)
//! - `session_<id>` (legacy)
//!
//! Resolution order:
//! 1. Timestamped directory for the id (latest stamp wins if several exist)
//! 2. Legacy directory for the id
//! 3. Any directory whose metadata says `active` (latest `start_time` wins);
//!    covers ids remapped by the host across a restart
//!
//! Callers treat `None` as "skip logging", never as a failure.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use fs_err as fs;

use crate::error::{PhoenixError, Result};
use crate::patterns::RE_TIMESTAMPED_SESSION_DIR;
use crate::storage::{metadata_file, ProjectLayout, SESSION_DIR_PREFIX};

use super::types::SessionMetadata;

const SESSION_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct SessionResolver {
    layout: ProjectLayout,
}

/// Result of [`SessionResolver::allocate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub dir: PathBuf,
    pub created: bool,
}

impl SessionResolver {
    pub fn new(layout: &ProjectLayout) -> Self {
        Self {
            layout: layout.clone(),
        }
    }

    pub fn resolve(&self, session_id: &str) -> Option<PathBuf> {
        self.find_exact(session_id).or_else(|| {
            let active = self.find_active();
            if let Some(dir) = &active {
                tracing::debug!(
                    session = %session_id,
                    dir = %dir.display(),
                    "No directory for session id, using active session"
                );
            }
            active
        })
    }

    /// Steps 1 and 2 only: a directory that belongs to this id by name.
    pub fn find_exact(&self, session_id: &str) -> Option<PathBuf> {
        let id = sanitize_session_id(session_id);
        self.find_timestamped(&id).or_else(|| {
            let legacy = self.layout.legacy_session_dir(&id);
            legacy.is_dir().then_some(legacy)
        })
    }

    fn find_timestamped(&self, id: &str) -> Option<PathBuf> {
        self.session_dirs()
            .into_iter()
            .filter_map(|dir| {
                let name = dir.file_name()?.to_str()?.to_string();
                let caps = RE_TIMESTAMPED_SESSION_DIR.captures(&name)?;
                (caps.get(2)?.as_str() == id).then(|| (caps[1].to_string(), dir))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, dir)| dir)
    }

    /// The most recently started session still marked `active`.
    pub fn find_active(&self) -> Option<PathBuf> {
        self.session_dirs()
            .into_iter()
            .filter_map(|dir| {
                let metadata = read_metadata(&dir)?;
                metadata
                    .is_active()
                    .then_some((metadata.start_time, dir))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, dir)| dir)
    }

    /// Returns the existing directory for `session_id`, or creates a new
    /// timestamped one. Never falls back to another session's directory.
    pub fn allocate(&self, session_id: &str, now: DateTime<Local>) -> Result<Allocation> {
        if let Some(dir) = self.find_exact(session_id) {
            return Ok(Allocation {
                dir,
                created: false,
            });
        }
        let id = sanitize_session_id(session_id);
        let stamp = now.format(SESSION_STAMP_FORMAT).to_string();
        let dir = self.layout.timestamped_session_dir(&stamp, &id);
        // create_dir_all tolerates a concurrent hook creating the same directory.
        fs::create_dir_all(&dir)
            .map_err(|e| PhoenixError::io(format!("creating {}", dir.display()), e))?;
        Ok(Allocation { dir, created: true })
    }

    fn session_dirs(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.layout.logs_dir()) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(SESSION_DIR_PREFIX))
            })
            .collect()
    }
}

fn read_metadata(dir: &Path) -> Option<SessionMetadata> {
    let content = fs::read_to_string(metadata_file(dir)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Restricts an id to `[A-Za-z0-9_-]` so it is safe as a path component.
pub fn sanitize_session_id(session_id: &str) -> String {
    let cleaned: String = session_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
