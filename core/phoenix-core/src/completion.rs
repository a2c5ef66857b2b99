//! Completion detection for the generator sub-agent.
//!
//! Two independent signals decide whether a new agent was produced:
//!
//! 1. **Structured marker** in the generator's final response
//!    (`✅ **AGENT_CREATED**: <name> specialized for <purpose>`). First match wins;
//!    later markers in the same text are ignored.
//! 2. **Artifact fallback**: more than one agent definition (`*.md`, the
//!    baseline meta definition counts as one) AND at least one generated
//!    tool-server file. The generator does not always emit the marker, so this
//!    is a best-effort signal, not a guarantee.

use std::path::{Path, PathBuf};

use fs_err as fs;

use crate::patterns::RE_AGENT_CREATED;
use crate::storage::ProjectLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCreated {
    pub agent_name: String,
    pub purpose: String,
}

/// How a completion was established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Signal(AgentCreated),
    ArtifactFallback,
}

impl Detection {
    pub fn agent_name(&self) -> &str {
        match self {
            Detection::Signal(created) => &created.agent_name,
            Detection::ArtifactFallback => "unknown",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Detection::Signal(created) => format!(
                "✅ **AGENT_CREATED**: {} specialized for {}",
                created.agent_name,
                truncate_chars(&created.purpose, 50)
            ),
            Detection::ArtifactFallback => "file creation fallback".to_string(),
        }
    }
}

/// Scans free text for the structured completion marker.
pub fn detect_signal(text: &str) -> Option<AgentCreated> {
    let caps = RE_AGENT_CREATED.captures(text)?;
    let agent_name = caps.get(1)?.as_str().to_string();
    let purpose = caps.get(2)?.as_str().trim().to_string();
    if purpose.is_empty() {
        return None;
    }
    Some(AgentCreated {
        agent_name,
        purpose,
    })
}

/// Filesystem probe for the artifact fallback.
#[derive(Debug, Clone)]
pub struct ArtifactProbe {
    agents_dir: PathBuf,
    tools_dir: PathBuf,
    tool_extension: String,
}

impl ArtifactProbe {
    pub fn new(agents_dir: PathBuf, tools_dir: PathBuf, tool_extension: &str) -> Self {
        Self {
            agents_dir,
            tools_dir,
            tool_extension: tool_extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn for_layout(layout: &ProjectLayout, tool_extension: &str) -> Self {
        Self::new(layout.agents_dir(), layout.generated_tools_dir(), tool_extension)
    }

    pub fn agent_definition_count(&self) -> usize {
        count_files(&self.agents_dir, |name| name.ends_with(".md"))
    }

    pub fn tool_server_files(&self) -> Vec<PathBuf> {
        list_files(&self.tools_dir, |name| {
            !name.starts_with("__")
                && Path::new(name)
                    .extension()
                    .is_some_and(|ext| ext == self.tool_extension.as_str())
        })
    }

    /// Both conditions must hold.
    pub fn artifacts_present(&self) -> bool {
        self.agent_definition_count() > 1 && !self.tool_server_files().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    probe: ArtifactProbe,
}

impl CompletionDetector {
    pub fn new(probe: ArtifactProbe) -> Self {
        Self { probe }
    }

    /// Marker first; the artifact fallback only when the marker is absent.
    pub fn detect(&self, response_text: Option<&str>) -> Option<Detection> {
        if let Some(created) = response_text.and_then(detect_signal) {
            return Some(Detection::Signal(created));
        }
        if self.probe.artifacts_present() {
            return Some(Detection::ArtifactFallback);
        }
        None
    }

    pub fn probe(&self) -> &ArtifactProbe {
        &self.probe
    }
}

fn list_files<F>(dir: &Path, keep: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> bool,
{
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(&keep)
        })
        .collect();
    files.sort();
    files
}

fn count_files<F>(dir: &Path, keep: F) -> usize
where
    F: Fn(&str) -> bool,
{
    list_files(dir, keep).len()
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detects_marker_with_surrounding_text() {
        let text = "Done.\n\n✅ **AGENT_CREATED**: leetspeak-converter specialized for text to leet conversion\n\nFiles written.";
        let created = detect_signal(text).unwrap();
        assert_eq!(created.agent_name, "leetspeak-converter");
        assert_eq!(created.purpose, "text to leet conversion");
    }

    #[test]
    fn marker_is_case_insensitive() {
        let text = "✅ **agent_created**: calc_agent SPECIALIZED FOR arithmetic";
        let created = detect_signal(text).unwrap();
        assert_eq!(created.agent_name, "calc_agent");
        assert_eq!(created.purpose, "arithmetic");
    }

    #[test]
    fn first_marker_wins() {
        let text = "✅ **AGENT_CREATED**: first specialized for one\n✅ **AGENT_CREATED**: second specialized for two";
        assert_eq!(detect_signal(text).unwrap().agent_name, "first");
    }

    #[test]
    fn purpose_stops_at_end_of_line() {
        let text = "✅ **AGENT_CREATED**: a-b specialized for math  \r\nnext line";
        assert_eq!(detect_signal(text).unwrap().purpose, "math");
    }

    #[test]
    fn missing_emoji_or_purpose_is_no_match() {
        assert!(detect_signal("**AGENT_CREATED**: x specialized for y").is_none());
        assert!(detect_signal("✅ **AGENT_CREATED**: x specialized for\n").is_none());
        assert!(detect_signal("agent created for math").is_none());
    }

    fn probe_for(root: &Path) -> ArtifactProbe {
        ArtifactProbe::for_layout(&ProjectLayout::new(root), "py")
    }

    #[test]
    fn fallback_requires_extra_agent_and_tool_file() {
        let temp = tempdir().unwrap();
        let layout = ProjectLayout::new(temp.path());
        fs::create_dir_all(layout.agents_dir()).unwrap();
        fs::create_dir_all(layout.generated_tools_dir()).unwrap();
        fs::write(layout.agents_dir().join("meta-agent.md"), "meta").unwrap();

        let probe = probe_for(temp.path());
        assert!(!probe.artifacts_present());

        fs::write(layout.agents_dir().join("calc.md"), "calc").unwrap();
        assert!(!probe.artifacts_present(), "no tool server yet");

        fs::write(layout.generated_tools_dir().join("__init__.py"), "").unwrap();
        assert!(!probe.artifacts_present(), "dunder files do not count");

        fs::write(layout.generated_tools_dir().join("calc_server.py"), "").unwrap();
        assert!(probe.artifacts_present());
    }

    #[test]
    fn tool_file_alone_is_not_enough() {
        let temp = tempdir().unwrap();
        let layout = ProjectLayout::new(temp.path());
        fs::create_dir_all(layout.agents_dir()).unwrap();
        fs::create_dir_all(layout.generated_tools_dir()).unwrap();
        fs::write(layout.agents_dir().join("meta-agent.md"), "meta").unwrap();
        fs::write(layout.generated_tools_dir().join("calc_server.py"), "").unwrap();
        assert!(!probe_for(temp.path()).artifacts_present());
    }

    #[test]
    fn detector_prefers_signal_over_fallback() {
        let temp = tempdir().unwrap();
        let detector = CompletionDetector::new(probe_for(temp.path()));
        let text = "✅ **AGENT_CREATED**: calc specialized for math";
        assert!(matches!(detector.detect(Some(text)), Some(Detection::Signal(_))));
        assert_eq!(detector.detect(Some("nothing here")), None);
        assert_eq!(detector.detect(None), None);
    }

    #[test]
    fn detector_falls_back_to_artifacts() {
        let temp = tempdir().unwrap();
        let layout = ProjectLayout::new(temp.path());
        fs::create_dir_all(layout.agents_dir()).unwrap();
        fs::create_dir_all(layout.generated_tools_dir()).unwrap();
        fs::write(layout.agents_dir().join("meta-agent.md"), "").unwrap();
        fs::write(layout.agents_dir().join("calc.md"), "").unwrap();
        fs::write(layout.generated_tools_dir().join("calc_server.py"), "").unwrap();

        let detector = CompletionDetector::new(probe_for(temp.path()));
        assert_eq!(
            detector.detect(Some("no marker")),
            Some(Detection::ArtifactFallback)
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}
