//! Session-start: allocate the session directory, metadata and registry entry.

use chrono::Local;
use phoenix_core::{
    collect_git_context, EventKind, EventRecord, PhoenixError, RegistryEntry, SessionMetadata,
    SessionRegistry, SessionStatus, SessionStore,
};

use crate::context::HookContext;

pub fn run(
    ctx: &HookContext,
    session_id: Option<&str>,
    source: Option<String>,
) -> Result<(), PhoenixError> {
    let id = session_id.unwrap_or("unknown");
    let now = Local::now();
    let allocation = ctx.resolver.allocate(id, now)?;
    let store = SessionStore::open(&allocation.dir);

    let metadata = match store.read_metadata() {
        Some(existing) => existing,
        None => {
            let fresh = SessionMetadata::new(id, source.clone(), now);
            store.write_metadata(&fresh)?;
            fresh
        }
    };
    tracing::info!(
        session = %id,
        dir = %allocation.dir.display(),
        created = allocation.created,
        "Session started"
    );

    let record = EventRecord::now(EventKind::SessionStart {
        source: source.clone(),
        git_context: collect_git_context(ctx.layout.root()),
    });
    ctx.persist(&store, &record, |_| {});

    let entry = RegistryEntry {
        session_id: metadata.session_id.clone(),
        start_time: metadata.start_time,
        source: source.or(metadata.source.clone()),
        status: SessionStatus::Active,
        report_path: store.metadata_path(),
        end_time: None,
        duration: None,
    };
    if let Err(err) = SessionRegistry::new(&ctx.layout).upsert(entry) {
        tracing::warn!(error = %err, "Could not update session registry");
    }
    Ok(())
}
