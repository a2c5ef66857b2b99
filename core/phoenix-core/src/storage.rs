//! Path management for a phoenix-supervised project.
//!
//! Every file the hooks and the supervisor share lives under the project root
//! (the working directory the host assistant runs in). `ProjectLayout` is the
//! single place those paths are decided, so tests can point a whole
//! hook/supervisor pipeline at a temp directory with [`ProjectLayout::new`].
//!
//! ```text
//! <project>/
//! ├── .restart_needed                  # restart-request marker (zero bytes)
//! ├── .primary_locked                  # lock marker (zero bytes)
//! ├── flow_progress.log                # four-step flow log
//! ├── .claude/agents/*.md              # agent definitions
//! ├── .claude/phoenix.json             # optional project config
//! ├── dynamic_agents/generated_mcp/    # generated tool servers
//! └── logs/
//!     ├── session_registry.json
//!     ├── quarantine/
//!     └── session_<YYYYmmdd_HHMMSS>_<id>/
//!         ├── session_events.json
//!         └── session_metadata.json
//! ```

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable the host sets for hook processes.
pub const PROJECT_DIR_ENV: &str = "CLAUDE_PROJECT_DIR";

pub const RESTART_MARKER_NAME: &str = ".restart_needed";
pub const LOCK_MARKER_NAME: &str = ".primary_locked";
pub const EVENTS_FILE_NAME: &str = "session_events.json";
pub const METADATA_FILE_NAME: &str = "session_metadata.json";
pub const SESSION_DIR_PREFIX: &str = "session_";

#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the project root: explicit override, then `$CLAUDE_PROJECT_DIR`,
    /// then the current directory.
    pub fn discover(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return Self::new(path);
        }
        if let Some(dir) = env::var_os(PROJECT_DIR_ENV).filter(|v| !v.is_empty()) {
            return Self::new(PathBuf::from(dir));
        }
        Self::new(env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Markers
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn restart_marker(&self) -> PathBuf {
        self.root.join(RESTART_MARKER_NAME)
    }

    pub fn lock_marker(&self) -> PathBuf {
        self.root.join(LOCK_MARKER_NAME)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Logs
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.logs_dir().join("session_registry.json")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.logs_dir().join("quarantine")
    }

    pub fn flow_log(&self) -> PathBuf {
        self.root.join("flow_progress.log")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Generated artifacts
    // ─────────────────────────────────────────────────────────────────────────────

    /// Agent definition markdown files (`meta-agent.md` is the baseline).
    pub fn agents_dir(&self) -> PathBuf {
        self.root.join(".claude").join("agents")
    }

    pub fn generated_tools_dir(&self) -> PathBuf {
        self.root.join("dynamic_agents").join("generated_mcp")
    }

    pub fn project_config_file(&self) -> PathBuf {
        self.root.join(".claude").join("phoenix.json")
    }

    pub fn default_system_prompt(&self) -> PathBuf {
        self.root
            .join("dynamic_agents")
            .join("system_prompts")
            .join("primary_agent.md")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Per-session paths
    // ─────────────────────────────────────────────────────────────────────────────

    /// Legacy bare-ID directory: `logs/session_<id>`.
    pub fn legacy_session_dir(&self, session_id: &str) -> PathBuf {
        self.logs_dir()
            .join(format!("{}{}", SESSION_DIR_PREFIX, session_id))
    }

    /// Timestamped directory: `logs/session_<stamp>_<id>`.
    pub fn timestamped_session_dir(&self, stamp: &str, session_id: &str) -> PathBuf {
        self.logs_dir()
            .join(format!("{}{}_{}", SESSION_DIR_PREFIX, stamp, session_id))
    }
}

pub fn events_file(session_dir: &Path) -> PathBuf {
    session_dir.join(EVENTS_FILE_NAME)
}

pub fn metadata_file(session_dir: &Path) -> PathBuf {
    session_dir.join(METADATA_FILE_NAME)
}
