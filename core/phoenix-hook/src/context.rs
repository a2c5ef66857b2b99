//! Per-invocation state shared by the dispatchers.

use chrono::Local;
use fs_err as fs;
use phoenix_core::{
    EventRecord, FlowLog, PhoenixConfig, PhoenixError, ProjectLayout, RestartCoordinator,
    SessionMetadata, SessionResolver, SessionStore,
};

pub struct HookContext {
    pub layout: ProjectLayout,
    pub config: PhoenixConfig,
    pub flow: FlowLog,
    pub resolver: SessionResolver,
}

impl HookContext {
    pub fn load(layout: ProjectLayout) -> Self {
        let config = PhoenixConfig::load(&layout);
        let flow = FlowLog::to_file(layout.flow_log());
        Self::new(layout, config, flow)
    }

    pub fn new(layout: ProjectLayout, config: PhoenixConfig, flow: FlowLog) -> Self {
        let resolver = SessionResolver::new(&layout);
        Self {
            layout,
            config,
            flow,
            resolver,
        }
    }

    pub fn coordinator(&self) -> RestartCoordinator<'_> {
        RestartCoordinator::new(&self.config, &self.layout, &self.flow)
    }

    /// The store for `session_id`, or `None` (skip logging) if no directory
    /// can be resolved.
    pub fn session_store(&self, session_id: Option<&str>) -> Option<SessionStore> {
        let id = session_id.unwrap_or_default();
        match self.resolver.resolve(id) {
            Some(dir) => Some(SessionStore::open(dir)),
            None => {
                tracing::debug!(session = %id, "No session directory; skipping event log");
                None
            }
        }
    }

    /// Appends `record` and applies `update`. Failures go to the fallback sink
    /// and are otherwise swallowed.
    pub fn persist<F>(&self, store: &SessionStore, record: &EventRecord, update: F)
    where
        F: FnOnce(&mut SessionMetadata),
    {
        if let Err(err) = store.record(record, update) {
            self.report_persist_failure(record, &err);
        }
    }

    pub fn report_persist_failure(&self, record: &EventRecord, err: &PhoenixError) {
        tracing::warn!(error = %err, "Could not persist session event");
        match serde_json::to_value(record) {
            Ok(value) => self.flow.fallback_record(&value),
            Err(e) => tracing::warn!(error = %e, "Could not serialize fallback record"),
        }
    }

    /// Saves an unparseable payload under `logs/quarantine/`.
    pub fn quarantine(&self, hook_label: &str, raw: &str) {
        let dir = self.layout.quarantine_dir();
        let path = dir.join(format!(
            "{}-{}.json",
            Local::now().format("%Y%m%d_%H%M%S%.3f"),
            hook_label
        ));
        let result = fs::create_dir_all(&dir).and_then(|_| fs::write(&path, raw));
        match result {
            Ok(()) => tracing::warn!(path = %path.display(), "Quarantined malformed hook payload"),
            Err(e) => tracing::warn!(error = %e, "Could not quarantine malformed hook payload"),
        }
    }
}
