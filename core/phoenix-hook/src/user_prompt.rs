use phoenix_core::{preview, EventKind, EventRecord, PROMPT_PREVIEW_CHARS};

use crate::context::HookContext;

pub fn run(ctx: &HookContext, session_id: Option<&str>, prompt: &str) {
    let Some(store) = ctx.session_store(session_id) else {
        return;
    };
    let record = EventRecord::now(EventKind::UserPrompt {
        prompt_preview: preview(prompt, PROMPT_PREVIEW_CHARS),
        prompt_length: prompt.chars().count() as u64,
    });
    ctx.persist(&store, &record, |metadata| {
        metadata.metrics.total_interactions += 1;
        metadata.agents.primary.interactions += 1;
    });
}
