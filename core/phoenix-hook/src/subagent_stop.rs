//! Sub-agent-stop dispatcher.
//!
//! The host can fire this hook before the post-tool-use hook for the same
//! delegation has written its record. After a settle delay the event log is
//! polled (bounded attempts, fixed delay) for a delegation post-tool-use at or
//! after the latest delegation pre-tool-use. If none shows up the hook carries
//! on with whatever the payload itself provides.

use std::thread;

use chrono::SecondsFormat;
use serde_json::json;

use phoenix_core::{
    preview, EventKind, EventRecord, FlowStep, RestartOutcome, RestartRequest, SessionStore,
    SUBAGENT_RESULT_PREVIEW_CHARS,
};

use crate::context::HookContext;

/// Delegation details recovered from the event log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelegationResult {
    pub subagent_type: Option<String>,
    pub response_text: Option<String>,
    pub completion_key: Option<String>,
}

pub fn run(
    ctx: &HookContext,
    session_id: Option<&str>,
    subagent_type: Option<String>,
    result_text: Option<String>,
) {
    let store = ctx.session_store(session_id);
    let recovered = store
        .as_ref()
        .and_then(|store| wait_for_delegation_result(ctx, store))
        .unwrap_or_default();

    let subagent_type = subagent_type.or(recovered.subagent_type);
    let text = result_text.or(recovered.response_text);

    let mut coordinator = ctx.coordinator();
    let cause = coordinator.evaluate_subagent_stop(subagent_type.as_deref(), text.as_deref());

    if let Some(store) = &store {
        let record = EventRecord::now(EventKind::SubagentStop {
            subagent_type: subagent_type.clone(),
            result_preview: preview(
                text.as_deref().unwrap_or_default(),
                SUBAGENT_RESULT_PREVIEW_CHARS,
            ),
            agent_creation_detected: cause.is_some(),
        });
        ctx.persist(store, &record, |_| {});
    }

    let Some(cause) = cause else {
        tracing::debug!(subagent = ?subagent_type, "Sub-agent stopped; no restart");
        return;
    };
    let request = RestartRequest {
        cause,
        completion_key: recovered.completion_key,
        subagent_type,
    };
    match coordinator.run(store.as_ref(), request) {
        Ok(RestartOutcome::Signaled { .. }) => {
            tracing::info!("Restart signaled from sub-agent stop")
        }
        Ok(outcome) => tracing::debug!(?outcome, "Restart not signaled"),
        Err(err) => {
            tracing::warn!(error = %err, "Restart coordination failed");
            ctx.flow.step(
                FlowStep::RestartSignaled,
                "restart_failed",
                &json!({ "error": err.to_string() }),
            );
        }
    }
}

/// Settle, then poll the event log for the delegation's result.
fn wait_for_delegation_result(
    ctx: &HookContext,
    store: &SessionStore,
) -> Option<DelegationResult> {
    let settings = &ctx.config.subagent_stop;
    thread::sleep(settings.settle_delay());

    let attempts = settings.max_attempts.max(1);
    for attempt in 1..=attempts {
        let events = store.read_events();
        if let Some(found) = latest_delegation_result(&events, &ctx.config.delegation_tool) {
            tracing::debug!(attempt, "Found delegation result");
            return Some(found);
        }
        if attempt < attempts {
            thread::sleep(settings.retry_delay());
        }
    }
    tracing::info!(attempts, "Delegation result not found; continuing without it");
    None
}

/// The latest delegation post-tool-use, provided it is not older than the
/// latest delegation pre-tool-use (otherwise the current delegation's result
/// has not landed yet).
pub fn latest_delegation_result(
    events: &[EventRecord],
    delegation_tool: &str,
) -> Option<DelegationResult> {
    let latest_pre = events.iter().rev().find_map(|e| match &e.kind {
        EventKind::PreToolUse {
            tool_name,
            subagent_type,
            ..
        } if tool_name == delegation_tool => {
            Some((e.timestamp, subagent_type.clone()))
        }
        _ => None,
    });
    let (post_at, post) = events.iter().rev().find_map(|e| match &e.kind {
        EventKind::PostToolUse { tool_name, .. } if tool_name == delegation_tool => {
            Some((e.timestamp, &e.kind))
        }
        _ => None,
    })?;

    if let Some((pre_at, _)) = &latest_pre {
        if post_at < *pre_at {
            return None;
        }
    }

    let EventKind::PostToolUse {
        tool_use_id,
        subagent_type,
        response_text,
        ..
    } = post
    else {
        return None;
    };
    Some(DelegationResult {
        subagent_type: subagent_type
            .clone()
            .or_else(|| latest_pre.and_then(|(_, pre_type)| pre_type)),
        response_text: response_text.clone(),
        completion_key: Some(
            tool_use_id
                .clone()
                .unwrap_or_else(|| post_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_in, start_session};
    use chrono::{Duration, Local};
    use phoenix_core::RestartPolicy;
    use tempfile::tempdir;

    const SIGNAL: &str = "✅ **AGENT_CREATED**: calc-agent specialized for arithmetic";

    fn pre_at(offset: i64, subagent_type: &str) -> EventRecord {
        EventRecord {
            timestamp: Local::now() + Duration::seconds(offset),
            kind: EventKind::PreToolUse {
                tool_name: "Task".to_string(),
                subagent_type: Some(subagent_type.to_string()),
                description: None,
                parameters_summary: "{}".to_string(),
                blocked: false,
            },
        }
    }

    fn post_at(offset: i64, id: Option<&str>, text: &str) -> EventRecord {
        EventRecord {
            timestamp: Local::now() + Duration::seconds(offset),
            kind: EventKind::PostToolUse {
                tool_name: "Task".to_string(),
                tool_use_id: id.map(str::to_string),
                subagent_type: None,
                success: true,
                error: None,
                result_preview: preview(text, 300),
                response_text: Some(text.to_string()),
            },
        }
    }

    #[test]
    fn pairs_latest_post_with_pre() {
        let events = vec![pre_at(0, "meta-agent"), post_at(1, Some("toolu_9"), SIGNAL)];
        let found = latest_delegation_result(&events, "Task").unwrap();
        assert_eq!(found.subagent_type.as_deref(), Some("meta-agent"));
        assert_eq!(found.response_text.as_deref(), Some(SIGNAL));
        assert_eq!(found.completion_key.as_deref(), Some("toolu_9"));
    }

    #[test]
    fn stale_post_is_ignored() {
        let events = vec![
            pre_at(0, "meta-agent"),
            post_at(1, Some("old"), "first"),
            pre_at(2, "meta-agent"),
        ];
        assert!(latest_delegation_result(&events, "Task").is_none());
    }

    #[test]
    fn completion_key_falls_back_to_timestamp() {
        let events = vec![post_at(0, None, "text")];
        let found = latest_delegation_result(&events, "Task").unwrap();
        assert!(found.completion_key.unwrap().contains('T'));
    }

    #[test]
    fn signals_restart_from_logged_delegation() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        let store = start_session(&ctx, "s1");
        store.append(&pre_at(0, "meta-agent")).unwrap();
        store.append(&post_at(1, Some("toolu_1"), SIGNAL)).unwrap();

        run(&ctx, Some("s1"), None, None);

        assert!(ctx.layout.restart_marker().exists());
        let meta = store.read_metadata().unwrap();
        assert_eq!(meta.metrics.restarts, 1);
        assert!(meta.has_handled("toolu_1"));
        assert!(matches!(
            store.read_events().last().unwrap().kind,
            EventKind::SubagentStop {
                agent_creation_detected: true,
                ..
            }
        ));
    }

    #[test]
    fn does_not_restart_twice_for_one_completion() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        let store = start_session(&ctx, "s1");
        store.append(&pre_at(0, "meta-agent")).unwrap();
        store.append(&post_at(1, Some("toolu_1"), SIGNAL)).unwrap();

        run(&ctx, Some("s1"), None, None);
        fs_err::remove_file(ctx.layout.restart_marker()).unwrap();
        run(&ctx, Some("s1"), None, None);

        assert!(!ctx.layout.restart_marker().exists());
        assert_eq!(store.read_metadata().unwrap().metrics.restarts, 1);
    }

    #[test]
    fn other_roles_do_not_restart_under_default_policy() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        let store = start_session(&ctx, "s1");
        store.append(&pre_at(0, "code-reviewer")).unwrap();
        store.append(&post_at(1, Some("toolu_2"), "review done")).unwrap();

        run(&ctx, Some("s1"), None, None);
        assert!(!ctx.layout.restart_marker().exists());
    }

    #[test]
    fn any_stop_policy_restarts_for_any_role() {
        let temp = tempdir().unwrap();
        let mut ctx = context_in(temp.path());
        ctx.config.restart_policy = RestartPolicy::AnySubagentStop;
        let store = start_session(&ctx, "s1");
        store.append(&pre_at(0, "code-reviewer")).unwrap();
        store.append(&post_at(1, Some("toolu_3"), "review done")).unwrap();

        run(&ctx, Some("s1"), None, None);
        assert!(ctx.layout.restart_marker().exists());
    }

    #[test]
    fn gives_up_after_bounded_retries() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        let store = start_session(&ctx, "s1");
        store.append(&pre_at(0, "meta-agent")).unwrap();

        let started = std::time::Instant::now();
        run(&ctx, Some("s1"), None, None);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert!(!ctx.layout.restart_marker().exists());
        assert!(matches!(
            store.read_events().last().unwrap().kind,
            EventKind::SubagentStop {
                agent_creation_detected: false,
                ..
            }
        ));
    }

    #[test]
    fn payload_text_is_used_without_session() {
        let temp = tempdir().unwrap();
        let ctx = context_in(temp.path());
        run(&ctx, None, Some("meta-agent".to_string()), Some(SIGNAL.to_string()));
        assert!(ctx.layout.restart_marker().exists());
    }
}
