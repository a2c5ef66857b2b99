use std::path::Path;

use phoenix_core::{FlowLog, PhoenixConfig, ProjectLayout, SessionStore, ToolCall};
use serde_json::json;

use crate::context::HookContext;
use crate::session_start;

/// Context rooted at `root` with no registration and no retry delays.
pub fn context_in(root: &Path) -> HookContext {
    let layout = ProjectLayout::new(root);
    let mut config = PhoenixConfig {
        register_tools: false,
        ..PhoenixConfig::default()
    };
    config.subagent_stop.settle_delay_ms = 0;
    config.subagent_stop.retry_delay_ms = 10;
    config.subagent_stop.max_attempts = 3;
    let flow = FlowLog::to_file(layout.flow_log());
    HookContext::new(layout, config, flow)
}

pub fn start_session(ctx: &HookContext, session_id: &str) -> SessionStore {
    session_start::run(ctx, Some(session_id), Some("startup".to_string())).unwrap();
    SessionStore::open(ctx.resolver.find_exact(session_id).unwrap())
}

pub fn tool_call(tool: &str, subagent_type: Option<&str>) -> ToolCall {
    let tool_input = match subagent_type {
        Some(kind) => json!({"subagent_type": kind, "description": "delegated work"}),
        None => json!({"file_path": "src/main.rs"}),
    };
    ToolCall {
        tool_name: tool.to_string(),
        tool_use_id: None,
        tool_input,
        subagent_type: subagent_type.map(str::to_string),
        from_subagent: false,
    }
}
