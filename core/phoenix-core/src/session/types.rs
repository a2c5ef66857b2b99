//! Serialized session types shared by the event log, metadata and registry.
//!
//! Event records are a tagged union keyed by `event_type`. Records are
//! immutable once appended; insertion order is the only ordering guarantee.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::completion::truncate_chars;

pub const PROMPT_PREVIEW_CHARS: usize = 100;
pub const PARAMETERS_PREVIEW_CHARS: usize = 200;
pub const RESULT_PREVIEW_CHARS: usize = 300;
pub const SUBAGENT_RESULT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EventRecord {
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    SessionStart {
        #[serde(default)]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        git_context: Option<GitContext>,
    },
    UserPrompt {
        prompt_preview: String,
        prompt_length: u64,
    },
    PreToolUse {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subagent_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        parameters_summary: String,
        #[serde(default)]
        blocked: bool,
    },
    PostToolUse {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subagent_type: Option<String>,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        result_preview: String,
        /// Full response text; kept only for delegation-tool calls.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_text: Option<String>,
    },
    SubagentStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subagent_type: Option<String>,
        result_preview: String,
        agent_creation_detected: bool,
    },
    SessionStop {
        #[serde(default)]
        stop_hook_active: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitContext {
    pub branch: String,
    pub uncommitted_changes: u64,
    pub last_commit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub total_interactions: u64,
    pub agents_created: u64,
    pub tools_used: u64,
    pub restarts: u64,
    pub hook_triggers: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorStatus {
    #[default]
    Ready,
    Active,
    Completed,
    RestartTriggered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecializedStatus {
    #[default]
    PendingRestart,
    Available,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryAgent {
    pub status: SessionStatus,
    pub interactions: u64,
}

impl Default for PrimaryAgent {
    fn default() -> Self {
        Self {
            status: SessionStatus::Active,
            interactions: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorAgent {
    pub status: GeneratorStatus,
    pub creations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializedAgent {
    #[serde(default)]
    pub purpose: Option<String>,
    pub created: DateTime<Local>,
    #[serde(default)]
    pub status: SpecializedStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentRoster {
    pub primary: PrimaryAgent,
    pub meta: GeneratorAgent,
    pub specialized: BTreeMap<String, SpecializedAgent>,
}

/// Per-session aggregate, rewritten whole on every hook invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: DateTime<Local>,
    #[serde(default)]
    pub source: Option<String>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_human: Option<String>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
    #[serde(default)]
    pub agents: AgentRoster,
    #[serde(default)]
    pub metrics: Metrics,
    /// Completion keys that already produced a restart.
    #[serde(default)]
    pub handled_completions: Vec<String>,
}

impl SessionMetadata {
    pub fn new(session_id: &str, source: Option<String>, start_time: DateTime<Local>) -> Self {
        Self {
            session_id: session_id.to_string(),
            start_time,
            source,
            status: SessionStatus::Active,
            end_time: None,
            duration_seconds: None,
            duration_human: None,
            events: Vec::new(),
            agents: AgentRoster::default(),
            metrics: Metrics::default(),
            handled_completions: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Marks the session completed. Returns false if it already was.
    pub fn complete(&mut self, end_time: DateTime<Local>) -> bool {
        if self.status == SessionStatus::Completed {
            return false;
        }
        let seconds = end_time
            .signed_duration_since(self.start_time)
            .num_seconds()
            .max(0);
        self.status = SessionStatus::Completed;
        self.end_time = Some(end_time);
        self.duration_seconds = Some(seconds);
        self.duration_human = Some(format_duration(seconds));
        self.agents.primary.status = SessionStatus::Completed;
        true
    }

    pub fn has_handled(&self, completion_key: &str) -> bool {
        self.handled_completions.iter().any(|k| k == completion_key)
    }
}

/// `H:MM:SS`, hours unbounded.
pub fn format_duration(total_seconds: i64) -> String {
    let total = total_seconds.max(0);
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

pub fn preview(text: &str, max_chars: usize) -> String {
    truncate_chars(text, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn event_record_serializes_flat_with_tag() {
        let record = EventRecord::now(EventKind::UserPrompt {
            prompt_preview: "hi".to_string(),
            prompt_length: 2,
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["event_type"], "user_prompt");
        assert_eq!(value["prompt_length"], 2);
        assert!(value.get("timestamp").is_some());

        let back: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let raw = r#"{"timestamp":"2025-01-01T10:00:00+00:00","event_type":"pre_tool_use",
                      "tool_name":"Write","parameters_summary":"{}"}"#;
        let record: EventRecord = serde_json::from_str(raw).unwrap();
        match record.kind {
            EventKind::PreToolUse {
                subagent_type,
                blocked,
                ..
            } => {
                assert!(subagent_type.is_none());
                assert!(!blocked);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn complete_is_idempotent() {
        let start = Local::now() - Duration::seconds(3725);
        let mut meta = SessionMetadata::new("s1", None, start);
        assert!(meta.complete(start + Duration::seconds(3725)));
        assert_eq!(meta.duration_seconds, Some(3725));
        assert_eq!(meta.duration_human.as_deref(), Some("1:02:05"));

        let first_end = meta.end_time;
        assert!(!meta.complete(Local::now()));
        assert_eq!(meta.end_time, first_end);
    }

    #[test]
    fn format_duration_clamps_negative() {
        assert_eq!(format_duration(-5), "0:00:00");
        assert_eq!(format_duration(59), "0:00:59");
    }
}
