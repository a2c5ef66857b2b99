//! Session-stop: mark the session completed. A second stop is a no-op.

use chrono::Local;
use phoenix_core::{EventKind, EventRecord, SessionMetadata, SessionRegistry};

use crate::context::HookContext;

pub fn run(ctx: &HookContext, session_id: Option<&str>, stop_hook_active: bool) {
    let Some(store) = ctx.session_store(session_id) else {
        return;
    };
    let end_time = Local::now();
    let record = EventRecord {
        timestamp: end_time,
        kind: EventKind::SessionStop { stop_hook_active },
    };

    let completed = store.record_if(&record, SessionMetadata::is_active, |metadata| {
        metadata.complete(end_time);
        (
            metadata.session_id.clone(),
            metadata.duration_human.clone().unwrap_or_default(),
        )
    });

    match completed {
        Ok(Some((id, duration))) => {
            tracing::info!(session = %id, duration = %duration, "Session completed");
            match SessionRegistry::new(&ctx.layout).mark_completed(&id, end_time, &duration) {
                Ok(true) => {}
                Ok(false) => tracing::debug!(session = %id, "Session not in registry"),
                Err(err) => tracing::warn!(error = %err, "Could not update session registry"),
            }
        }
        Ok(None) => tracing::debug!("Session already completed"),
        Err(err) => ctx.report_persist_failure(&record, &err),
    }
}
