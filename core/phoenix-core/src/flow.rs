//! Flow log for the four-step restart sequence.
//!
//! One line per step in `flow_progress.log`:
//!
//! ```text
//! 2025-03-01 09:00:00 [STEP-2] completion_detected: {"agent_name":"calc-agent",...}
//! ```
//!
//! A `FlowLog` is constructed once per process and passed down. Where lines
//! end up is decided by the [`FlowSink`] given at construction; the fallback
//! sink receives event-store records that could not be persisted.

use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use fs_err::OpenOptions;
use serde_json::{Map, Value};

const ESSENTIAL_KEYS: &[&str] = &[
    "agent_name",
    "subagent_type",
    "completion_signal",
    "mcp_status",
    "restart_status",
    "task_preview",
    "error",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    /// Top-level agent delegated to the generator.
    Delegated = 1,
    CompletionDetected = 2,
    /// Tools registered and restart marker written.
    RestartSignaled = 3,
    /// Supervisor relaunched the host.
    Relaunched = 4,
}

impl FlowStep {
    pub fn number(self) -> u8 {
        self as u8
    }
}

pub trait FlowSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Appends to a file; falls back to stderr when the file cannot be written.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FlowSink for FileSink {
    fn write_line(&self, line: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = result {
            tracing::debug!(error = %e, "Flow log unwritable, using stderr");
            eprintln!("{}", line);
        }
    }
}

pub struct StderrSink;

impl FlowSink for StderrSink {
    fn write_line(&self, line: &str) {
        eprintln!("{}", line);
    }
}

pub struct FlowLog {
    sink: Box<dyn FlowSink>,
    fallback: Box<dyn FlowSink>,
}

impl FlowLog {
    pub fn new(sink: Box<dyn FlowSink>, fallback: Box<dyn FlowSink>) -> Self {
        Self { sink, fallback }
    }

    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(FileSink::new(path)), Box::new(StderrSink))
    }

    pub fn to_stderr() -> Self {
        Self::new(Box::new(StderrSink), Box::new(StderrSink))
    }

    /// Records a step. Only the essential keys of `details` are kept.
    pub fn step(&self, step: FlowStep, event: &str, details: &Value) {
        let line = format!(
            "{} [STEP-{}] {}: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            step.number(),
            event,
            Value::Object(essential_fields(details))
        );
        self.sink.write_line(&line);
    }

    /// Emits a record that could not be written to its session files.
    pub fn fallback_record(&self, record: &Value) {
        self.fallback
            .write_line(&format!("[SESSION-LOG-FALLBACK] {}", record));
    }
}

fn essential_fields(details: &Value) -> Map<String, Value> {
    let Some(map) = details.as_object() else {
        return Map::new();
    };
    map.iter()
        .filter(|(key, value)| ESSENTIAL_KEYS.contains(&key.as_str()) && !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::MemorySink;
    use super::*;
    use fs_err as fs;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn step_line_format_keeps_essential_keys() {
        let sink = MemorySink::default();
        let flow = FlowLog::new(Box::new(sink.clone()), Box::new(StderrSink));
        flow.step(
            FlowStep::CompletionDetected,
            "completion_detected",
            &json!({"agent_name": "calc", "noise": 1, "error": null}),
        );

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.contains(" [STEP-2] completion_detected: "));
        assert!(line.ends_with(r#"{"agent_name":"calc"}"#));
        // "YYYY-mm-dd HH:MM:SS" prefix
        assert_eq!(line.find(" [STEP"), Some(19));
    }

    #[test]
    fn file_sink_appends_lines() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("flow_progress.log");
        let flow = FlowLog::to_file(&path);
        flow.step(FlowStep::Delegated, "delegated", &json!({}));
        flow.step(FlowStep::Relaunched, "relaunched", &json!({}));

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().nth(1).unwrap().contains("[STEP-4]"));
    }

    #[test]
    fn fallback_records_go_to_fallback_sink() {
        let main = MemorySink::default();
        let fallback = MemorySink::default();
        let flow = FlowLog::new(Box::new(main.clone()), Box::new(fallback.clone()));
        flow.fallback_record(&json!({"event_type": "user_prompt"}));

        assert!(main.lines().is_empty());
        assert_eq!(
            fallback.lines(),
            vec![r#"[SESSION-LOG-FALLBACK] {"event_type":"user_prompt"}"#.to_string()]
        );
    }
}
