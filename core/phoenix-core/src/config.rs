//! Configuration loading.
//!
//! Lookup order: `<project>/.claude/phoenix.json`, then `~/.claude/phoenix.json`,
//! then built-in defaults. The first file that exists wins as a whole; missing
//! fields take their defaults. Environment variables are applied last.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::error::{PhoenixError, Result};
use crate::restart::RestartPolicy;
use crate::storage::ProjectLayout;

pub const RESTART_POLICY_ENV: &str = "PHOENIX_RESTART_POLICY";
pub const REGISTER_TOOLS_ENV: &str = "PHOENIX_REGISTER_TOOLS";
pub const DEBUG_LOG_ENV: &str = "PHOENIX_DEBUG_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoenixConfig {
    /// The only tool the top-level agent may call once the lock marker exists.
    pub delegation_tool: String,
    /// Sub-agent role whose completion triggers a restart.
    pub generator_role: String,
    pub restart_policy: RestartPolicy,
    /// Run the tool registration step before signaling a restart.
    pub register_tools: bool,
    pub host_binary: String,
    pub tool_interpreter: String,
    pub tool_server_extension: String,
    pub continuation_prompt: String,
    pub subagent_stop: RetrySettings,
    pub supervisor: SupervisorSettings,
}

impl Default for PhoenixConfig {
    fn default() -> Self {
        Self {
            delegation_tool: "Task".to_string(),
            generator_role: "meta-agent".to_string(),
            restart_policy: RestartPolicy::default(),
            register_tools: true,
            host_binary: "claude".to_string(),
            tool_interpreter: "python".to_string(),
            tool_server_extension: "py".to_string(),
            continuation_prompt: "meta-agent finished. continue with original task".to_string(),
            subagent_stop: RetrySettings::default(),
            supervisor: SupervisorSettings::default(),
        }
    }
}

/// Bounded retry used by the sub-agent-stop hook while waiting for the
/// post-tool-use record to land in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub settle_delay_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
            max_attempts: 10,
            retry_delay_ms: 2000,
        }
    }
}

impl RetrySettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub poll_interval_ms: u64,
    pub grace_period_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            grace_period_ms: 5000,
        }
    }
}

impl PhoenixConfig {
    /// Loads config for a project, falling back to defaults on any problem.
    pub fn load(layout: &ProjectLayout) -> Self {
        let mut config = candidate_paths(layout)
            .into_iter()
            .find(|path| path.exists())
            .and_then(|path| match Self::load_file(&path) {
                Ok(config) => Some(config),
                Err(err) => {
                    tracing::warn!(error = %err, "Ignoring malformed config; using defaults");
                    None
                }
            })
            .unwrap_or_default();
        config.apply_env_overrides(|key| env::var(key).ok());
        config
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PhoenixError::io(format!("reading {}", path.display()), e))?;
        serde_json::from_str(&content).map_err(|e| PhoenixError::ConfigMalformed {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(RESTART_POLICY_ENV) {
            match value.parse::<RestartPolicy>() {
                Ok(policy) => self.restart_policy = policy,
                Err(err) => tracing::warn!(error = %err, "Ignoring {}", RESTART_POLICY_ENV),
            }
        }
        if let Some(value) = lookup(REGISTER_TOOLS_ENV) {
            self.register_tools = !matches!(
                value.trim().to_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }
    }
}

fn candidate_paths(layout: &ProjectLayout) -> Vec<PathBuf> {
    let mut paths = vec![layout.project_config_file()];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".claude").join("phoenix.json"));
    }
    paths
}
