//! Hook payloads as delivered on stdin by the host process.
//!
//! `HookInput` is the loose wire shape (every field optional, unknown fields
//! ignored). [`HookInput::to_event`] narrows it into a [`HookEvent`] so the
//! dispatchers never branch on dynamically shaped JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,

    // SessionStart
    #[serde(default)]
    pub source: Option<String>,

    // UserPromptSubmit
    #[serde(default)]
    pub prompt: Option<String>,

    // Pre/PostToolUse
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub tool_response: Option<Value>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,

    // Sub-agent identity (present on calls made from inside a sub-agent)
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,

    // SubagentStop / Stop
    #[serde(default)]
    pub subagent_type: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub stop_hook_active: Option<bool>,
}

/// A tool invocation as seen by the pre/post hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool_name: String,
    pub tool_use_id: Option<String>,
    pub tool_input: Value,
    /// `tool_input.subagent_type`; set only on delegation calls.
    pub subagent_type: Option<String>,
    /// The caller is itself a sub-agent (carries `agent_id`/`agent_type`).
    pub from_subagent: bool,
}

impl ToolCall {
    pub fn description(&self) -> Option<&str> {
        self.tool_input.get("description").and_then(Value::as_str)
    }

    /// True when this call is attributable to the top-level agent.
    pub fn is_top_level(&self) -> bool {
        self.subagent_type.is_none() && !self.from_subagent
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    SessionStart {
        source: Option<String>,
    },
    UserPromptSubmit {
        prompt: String,
    },
    PreToolUse(ToolCall),
    PostToolUse {
        call: ToolCall,
        response: Option<Value>,
        success: bool,
        error: Option<String>,
    },
    SubagentStop {
        subagent_type: Option<String>,
        result_text: Option<String>,
    },
    SessionStop {
        stop_hook_active: bool,
    },
}

/// Which dispatcher a payload is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    SessionStart,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    SubagentStop,
    SessionStop,
}

impl HookKind {
    /// Maps the host's `hook_event_name` onto a dispatcher.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "SessionStart" => Some(HookKind::SessionStart),
            "UserPromptSubmit" => Some(HookKind::UserPromptSubmit),
            "PreToolUse" => Some(HookKind::PreToolUse),
            "PostToolUse" => Some(HookKind::PostToolUse),
            "SubagentStop" => Some(HookKind::SubagentStop),
            "Stop" | "SessionEnd" => Some(HookKind::SessionStop),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HookKind::SessionStart => "session_start",
            HookKind::UserPromptSubmit => "user_prompt_submit",
            HookKind::PreToolUse => "pre_tool_use",
            HookKind::PostToolUse => "post_tool_use",
            HookKind::SubagentStop => "subagent_stop",
            HookKind::SessionStop => "session_stop",
        }
    }
}

impl HookInput {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Narrows the payload for the given dispatcher.
    ///
    /// Returns `None` when a field the dispatcher cannot work without is
    /// missing (e.g. a tool hook without `tool_name`).
    pub fn to_event(&self, kind: HookKind) -> Option<HookEvent> {
        match kind {
            HookKind::SessionStart => Some(HookEvent::SessionStart {
                source: self.source.clone(),
            }),
            HookKind::UserPromptSubmit => Some(HookEvent::UserPromptSubmit {
                prompt: self.prompt.clone().unwrap_or_default(),
            }),
            HookKind::PreToolUse => self.tool_call().map(HookEvent::PreToolUse),
            HookKind::PostToolUse => self.tool_call().map(|call| HookEvent::PostToolUse {
                call,
                response: self.tool_response.clone().or_else(|| self.result.clone()),
                success: self.success.unwrap_or(true),
                error: self.error.clone(),
            }),
            HookKind::SubagentStop => Some(HookEvent::SubagentStop {
                subagent_type: non_empty(self.subagent_type.as_deref()),
                result_text: self.result.as_ref().map(response_text),
            }),
            HookKind::SessionStop => Some(HookEvent::SessionStop {
                stop_hook_active: self.stop_hook_active.unwrap_or(false),
            }),
        }
    }

    fn tool_call(&self) -> Option<ToolCall> {
        let tool_name = non_empty(self.tool_name.as_deref())?;
        let tool_input = self.tool_input.clone().unwrap_or(Value::Null);
        let subagent_type = non_empty(tool_input.get("subagent_type").and_then(Value::as_str));
        let from_subagent = non_empty(self.agent_id.as_deref()).is_some()
            || non_empty(self.agent_type.as_deref()).is_some();
        Some(ToolCall {
            tool_name,
            tool_use_id: self.tool_use_id.clone(),
            tool_input,
            subagent_type,
            from_subagent,
        })
    }
}

/// Extracts readable text from a tool response.
///
/// `{"content": [{"type":"text","text":"..."}, ...]}` yields the joined text
/// parts; a bare string yields itself; anything else its JSON rendering.
pub fn response_text(response: &Value) -> String {
    match response {
        Value::String(text) => text.clone(),
        Value::Object(map) => {
            let parts: Vec<&str> = map
                .get("content")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.get("text").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();
            if parts.is_empty() {
                match map.get("content") {
                    Some(Value::String(text)) => text.clone(),
                    _ => response.to_string(),
                }
            } else {
                parts.join("\n")
            }
        }
        other => other.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
