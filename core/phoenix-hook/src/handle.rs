//! Entry point shared by every hook subcommand.
//!
//! Reads one JSON payload from stdin, narrows it to a typed [`HookEvent`] and
//! hands it to the matching dispatcher.
//!
//! ## Exit codes
//!
//! ```text
//! 0  allow / continue (also: empty stdin, malformed payload, internal errors)
//! 2  veto (pre-tool-use only, lock marker present)
//! ```

use std::io::{self, Read};

use phoenix_core::{HookEvent, HookInput, HookKind, PolicyDecision, ProjectLayout};

use crate::context::HookContext;
use crate::tool_use::PostToolUse;
use crate::{session_start, session_stop, subagent_stop, tool_use, user_prompt};

pub fn run(layout: ProjectLayout, requested: Option<HookKind>) -> i32 {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        tracing::warn!(error = %e, "Failed to read stdin");
        return 0;
    }
    if input.trim().is_empty() {
        return 0;
    }

    let ctx = HookContext::load(layout);
    let decision = dispatch(&ctx, &input, requested);
    if let PolicyDecision::Veto { message } = &decision {
        eprintln!("{}", message);
    }
    decision.exit_code()
}

/// Parses `raw` and runs the dispatcher for `requested` (or, when `None`, the
/// one named by the payload's `hook_event_name`).
pub fn dispatch(ctx: &HookContext, raw: &str, requested: Option<HookKind>) -> PolicyDecision {
    let input = match HookInput::parse(raw) {
        Ok(input) => input,
        Err(e) => {
            let label = requested.map(|k| k.label()).unwrap_or("unknown");
            tracing::warn!(hook = label, error = %e, "Malformed hook payload");
            ctx.quarantine(label, raw);
            return PolicyDecision::Allow;
        }
    };

    let kind = match requested.or_else(|| {
        input
            .hook_event_name
            .as_deref()
            .and_then(HookKind::from_event_name)
    }) {
        Some(kind) => kind,
        None => {
            tracing::debug!(event = ?input.hook_event_name, "Unhandled hook event");
            return PolicyDecision::Allow;
        }
    };

    let Some(event) = input.to_event(kind) else {
        tracing::warn!(hook = kind.label(), "Payload missing required fields");
        ctx.quarantine(kind.label(), raw);
        return PolicyDecision::Allow;
    };

    let session_id = input.session_id.as_deref();
    tracing::debug!(hook = kind.label(), session = ?session_id, "Dispatching hook");

    match event {
        HookEvent::SessionStart { source } => {
            if let Err(err) = session_start::run(ctx, session_id, source) {
                tracing::warn!(error = %err, "Session start failed");
            }
            PolicyDecision::Allow
        }
        HookEvent::UserPromptSubmit { prompt } => {
            user_prompt::run(ctx, session_id, &prompt);
            PolicyDecision::Allow
        }
        HookEvent::PreToolUse(call) => tool_use::pre(ctx, session_id, &call),
        HookEvent::PostToolUse {
            call,
            response,
            success,
            error,
        } => {
            tool_use::post(
                ctx,
                session_id,
                PostToolUse {
                    call: &call,
                    response: response.as_ref(),
                    success,
                    error: error.as_deref(),
                },
            );
            PolicyDecision::Allow
        }
        HookEvent::SubagentStop {
            subagent_type,
            result_text,
        } => {
            subagent_stop::run(ctx, session_id, subagent_type, result_text);
            PolicyDecision::Allow
        }
        HookEvent::SessionStop { stop_hook_active } => {
            session_stop::run(ctx, session_id, stop_hook_active);
            PolicyDecision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context_in;
    use fs_err as fs;
    use phoenix_core::{Marker, SessionStore};
    use tempfile::tempdir;

    #[test]
    fn malformed_payload_is_quarantined_and_allowed() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        let decision = dispatch(&ctx, "{not json", Some(HookKind::PreToolUse));
        assert_eq!(decision, PolicyDecision::Allow);

        let quarantined: Vec<_> = fs::read_dir(ctx.layout.quarantine_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(quarantined.len(), 1);
        let name = quarantined[0].file_name().to_string_lossy().into_owned();
        assert!(name.ends_with("-pre_tool_use.json"));
        assert_eq!(fs::read_to_string(quarantined[0].path()).unwrap(), "{not json");
    }

    #[test]
    fn auto_dispatch_uses_event_name() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        dispatch(
            &ctx,
            r#"{"session_id":"s1","hook_event_name":"SessionStart","source":"startup"}"#,
            None,
        );
        assert!(ctx.resolver.find_exact("s1").is_some());
    }

    #[test]
    fn unknown_event_name_is_allowed() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        let decision = dispatch(&ctx, r#"{"hook_event_name":"Notification"}"#, None);
        assert_eq!(decision, PolicyDecision::Allow);
    }

    #[test]
    fn veto_flows_through_dispatch() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        Marker::new(ctx.layout.lock_marker()).create().unwrap();
        let decision = dispatch(
            &ctx,
            r#"{"session_id":"s1","tool_name":"Write","tool_input":{"file_path":"a"}}"#,
            Some(HookKind::PreToolUse),
        );
        assert!(decision.is_veto());
    }

    #[test]
    fn full_session_lifecycle() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        let payloads = [
            (HookKind::SessionStart, r#"{"session_id":"s1","source":"startup"}"#),
            (HookKind::UserPromptSubmit, r#"{"session_id":"s1","prompt":"build a calculator"}"#),
            (
                HookKind::PreToolUse,
                r#"{"session_id":"s1","tool_name":"Task","tool_input":{"subagent_type":"meta-agent","prompt":"make calc"}}"#,
            ),
            (
                HookKind::PostToolUse,
                r#"{"session_id":"s1","tool_name":"Task","tool_use_id":"toolu_1","tool_input":{"subagent_type":"meta-agent"},"tool_response":{"content":[{"type":"text","text":"✅ **AGENT_CREATED**: calc-agent specialized for arithmetic"}]}}"#,
            ),
            (HookKind::SessionStop, r#"{"session_id":"s1"}"#),
        ];
        for (kind, raw) in payloads {
            assert_eq!(dispatch(&ctx, raw, Some(kind)), PolicyDecision::Allow);
        }

        let store = SessionStore::open(ctx.resolver.find_exact("s1").unwrap());
        assert_eq!(store.read_events().len(), 5);
        let meta = store.read_metadata().unwrap();
        assert!(!meta.is_active());
        assert_eq!(meta.metrics.restarts, 1);
        assert_eq!(meta.metrics.hook_triggers, 5);
        assert!(ctx.layout.restart_marker().exists());
    }
}
