//! Pre/post tool-use dispatchers.
//!
//! Pre-tool-use is the only hook that can veto. Post-tool-use watches the
//! generator's delegation result for a completion.

use chrono::SecondsFormat;
use serde_json::{json, Value};

use phoenix_core::{
    preview, response_text, DelegationGuard, EventKind, EventRecord, FlowStep, GeneratorStatus,
    Marker, PolicyDecision, RestartOutcome, RestartRequest, ToolCall, PARAMETERS_PREVIEW_CHARS,
    RESULT_PREVIEW_CHARS,
};

use crate::context::HookContext;

// ─────────────────────────────────────────────────────────────────────────────
// Pre-tool-use
// ─────────────────────────────────────────────────────────────────────────────

pub fn pre(ctx: &HookContext, session_id: Option<&str>, call: &ToolCall) -> PolicyDecision {
    let guard = DelegationGuard::new(
        ctx.config.delegation_tool.clone(),
        Marker::new(ctx.layout.lock_marker()),
    );
    let decision = guard.check(call);
    if decision.is_veto() {
        tracing::info!(tool = %call.tool_name, "Vetoed top-level tool call under lock");
    }

    let delegates_to_generator = is_generator_delegation(ctx, call);
    if delegates_to_generator {
        let task = call
            .tool_input
            .get("prompt")
            .and_then(Value::as_str)
            .or(call.description())
            .unwrap_or_default();
        ctx.flow.step(
            FlowStep::Delegated,
            "generator_delegated",
            &json!({
                "subagent_type": call.subagent_type,
                "task_preview": preview(task, 100),
            }),
        );
    }

    if let Some(store) = ctx.session_store(session_id) {
        let record = EventRecord::now(EventKind::PreToolUse {
            tool_name: call.tool_name.clone(),
            subagent_type: call.subagent_type.clone(),
            description: call.description().map(str::to_string),
            parameters_summary: preview(&call.tool_input.to_string(), PARAMETERS_PREVIEW_CHARS),
            blocked: decision.is_veto(),
        });
        ctx.persist(&store, &record, |metadata| {
            metadata.metrics.tools_used += 1;
            if delegates_to_generator {
                metadata.agents.meta.status = GeneratorStatus::Active;
            }
        });
    }

    decision
}

// ─────────────────────────────────────────────────────────────────────────────
// Post-tool-use
// ─────────────────────────────────────────────────────────────────────────────

pub struct PostToolUse<'a> {
    pub call: &'a ToolCall,
    pub response: Option<&'a Value>,
    pub success: bool,
    pub error: Option<&'a str>,
}

pub fn post(ctx: &HookContext, session_id: Option<&str>, event: PostToolUse<'_>) {
    let call = event.call;
    let text = event.response.map(response_text).unwrap_or_default();
    let is_delegation = call.tool_name == ctx.config.delegation_tool;

    let record = EventRecord::now(EventKind::PostToolUse {
        tool_name: call.tool_name.clone(),
        tool_use_id: call.tool_use_id.clone(),
        subagent_type: call.subagent_type.clone(),
        success: event.success,
        error: event.error.map(str::to_string),
        result_preview: preview(&text, RESULT_PREVIEW_CHARS),
        response_text: is_delegation.then(|| text.clone()),
    });
    let completion_key = call
        .tool_use_id
        .clone()
        .unwrap_or_else(|| record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true));

    let store = ctx.session_store(session_id);
    let from_generator = is_generator_delegation(ctx, call);
    if let Some(store) = &store {
        ctx.persist(store, &record, |metadata| {
            if from_generator {
                metadata.agents.meta.status = GeneratorStatus::Completed;
            }
        });
    }

    if !from_generator {
        return;
    }
    let mut coordinator = ctx.coordinator();
    let Some(cause) = coordinator.evaluate_generator_output(Some(&text)) else {
        tracing::debug!("Generator finished without a detectable completion");
        return;
    };
    let request = RestartRequest {
        cause,
        completion_key: Some(completion_key),
        subagent_type: call.subagent_type.clone(),
    };
    match coordinator.run(store.as_ref(), request) {
        Ok(RestartOutcome::Signaled { .. }) => {
            tracing::info!("Restart signaled from generator output")
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

fn is_generator_delegation(ctx: &HookContext, call: &ToolCall) -> bool {
    call.tool_name == ctx.config.delegation_tool
        && call.subagent_type.as_deref() == Some(ctx.config.generator_role.as_str())
}
