//! Restart coordination.
//!
//! Hook processes decide whether a restart is due and, if so, leave the restart
//! marker for the supervisor:
//!
//! ```text
//! Idle → CompletionDetected → RegistrationAttempted → RestartSignaled
//! ```
//!
//! The return to `Idle` belongs to the supervisor (it consumes the marker).
//!
//! Two trigger paths feed the coordinator: the post-tool-use hook with the
//! generator's response, and the sub-agent-stop hook. A completion key shared
//! by both (the delegation's `tool_use_id`, else its post-tool-use timestamp)
//! is recorded in the session metadata, and marker creation is exclusive, so a
//! single completion produces at most one restart.

use std::fmt;
use std::str::FromStr;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::completion::{detect_signal, ArtifactProbe, CompletionDetector, Detection};
use crate::config::PhoenixConfig;
use crate::error::{PhoenixError, Result};
use crate::flow::{FlowLog, FlowStep};
use crate::markers::Marker;
use crate::registration::{HostCliRegistrar, NoopRegistrar, Registrar, RegistrationReport};
use crate::session::{GeneratorStatus, SessionStore, SpecializedAgent, SpecializedStatus};
use crate::storage::ProjectLayout;

/// Which sub-agent stops may trigger a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Only generator completions (marker or artifact fallback).
    #[default]
    CompletionSignal,
    /// Every sub-agent stop.
    AnySubagentStop,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::CompletionSignal => "completion_signal",
            RestartPolicy::AnySubagentStop => "any_subagent_stop",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestartPolicy {
    type Err = PhoenixError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "completion_signal" => Ok(RestartPolicy::CompletionSignal),
            "any_subagent_stop" => Ok(RestartPolicy::AnySubagentStop),
            other => Err(PhoenixError::InvalidPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPhase {
    Idle,
    CompletionDetected,
    RegistrationAttempted,
    RestartSignaled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartCause {
    Completion(Detection),
    /// Sub-agent stopped under [`RestartPolicy::AnySubagentStop`] without a detection.
    SubagentStop,
}

impl RestartCause {
    pub fn agent_name(&self) -> &str {
        match self {
            RestartCause::Completion(detection) => detection.agent_name(),
            RestartCause::SubagentStop => "unknown",
        }
    }

    fn describe(&self) -> String {
        match self {
            RestartCause::Completion(detection) => detection.describe(),
            RestartCause::SubagentStop => "sub-agent stop".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub cause: RestartCause,
    pub completion_key: Option<String>,
    pub subagent_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Signaled { registration: RegistrationReport },
    /// A restart marker was already outstanding.
    AlreadyPending,
    /// This completion already produced a restart.
    AlreadyHandled,
}

pub struct RestartCoordinator<'a> {
    config: &'a PhoenixConfig,
    detector: CompletionDetector,
    registrar: Box<dyn Registrar + 'a>,
    restart_marker: Marker,
    flow: &'a FlowLog,
    phase: RestartPhase,
}

impl<'a> RestartCoordinator<'a> {
    pub fn new(config: &'a PhoenixConfig, layout: &ProjectLayout, flow: &'a FlowLog) -> Self {
        let registrar: Box<dyn Registrar> = if config.register_tools {
            Box::new(HostCliRegistrar::new(
                config.host_binary.clone(),
                config.tool_interpreter.clone(),
                layout.root(),
            ))
        } else {
            Box::new(NoopRegistrar)
        };
        Self::with_registrar(config, layout, flow, registrar)
    }

    pub fn with_registrar(
        config: &'a PhoenixConfig,
        layout: &ProjectLayout,
        flow: &'a FlowLog,
        registrar: Box<dyn Registrar + 'a>,
    ) -> Self {
        Self {
            config,
            detector: CompletionDetector::new(ArtifactProbe::for_layout(
                layout,
                &config.tool_server_extension,
            )),
            registrar,
            restart_marker: Marker::new(layout.restart_marker()),
            flow,
            phase: RestartPhase::Idle,
        }
    }

    pub fn phase(&self) -> RestartPhase {
        self.phase
    }

    /// Post-tool-use path: the generator's response text.
    pub fn evaluate_generator_output(&self, response_text: Option<&str>) -> Option<RestartCause> {
        self.detector
            .detect(response_text)
            .map(RestartCause::Completion)
    }

    /// Sub-agent-stop path, governed by the configured policy.
    ///
    /// Under `completion_signal` a known non-generator role never triggers, and
    /// an unknown role only triggers on the structured marker.
    pub fn evaluate_subagent_stop(
        &self,
        subagent_type: Option<&str>,
        response_text: Option<&str>,
    ) -> Option<RestartCause> {
        match self.config.restart_policy {
            RestartPolicy::AnySubagentStop => Some(
                self.evaluate_generator_output(response_text)
                    .unwrap_or(RestartCause::SubagentStop),
            ),
            RestartPolicy::CompletionSignal => match subagent_type {
                Some(role) if role == self.config.generator_role => {
                    self.evaluate_generator_output(response_text)
                }
                Some(_) => None,
                None => response_text
                    .and_then(detect_signal)
                    .map(|created| RestartCause::Completion(Detection::Signal(created))),
            },
        }
    }

    /// Drives the transitions for one restart request.
    pub fn run(
        &mut self,
        store: Option<&SessionStore>,
        request: RestartRequest,
    ) -> Result<RestartOutcome> {
        if self.restart_marker.exists() {
            tracing::info!("Restart already pending");
            return Ok(RestartOutcome::AlreadyPending);
        }
        if let (Some(store), Some(key)) = (store, request.completion_key.as_deref()) {
            if store.read_metadata().is_some_and(|m| m.has_handled(key)) {
                tracing::debug!(completion = %key, "Completion already handled");
                return Ok(RestartOutcome::AlreadyHandled);
            }
        }

        self.phase = RestartPhase::CompletionDetected;
        let agent_name = request.cause.agent_name().to_string();
        tracing::info!(agent = %agent_name, cause = %request.cause.describe(), "Restart warranted");
        self.flow.step(
            FlowStep::CompletionDetected,
            "completion_detected",
            &json!({
                "agent_name": agent_name,
                "subagent_type": request.subagent_type,
                "completion_signal": request.cause.describe(),
            }),
        );

        let registration = if self.config.register_tools {
            let servers = self.detector.probe().tool_server_files();
            self.registrar.register(&servers)
        } else {
            RegistrationReport::default()
        };
        if !registration.failures.is_empty() {
            tracing::warn!(
                failures = registration.failures.len(),
                "Tool registration incomplete, restarting anyway"
            );
        }
        self.phase = RestartPhase::RegistrationAttempted;

        if !self.restart_marker.create()? {
            tracing::info!("Restart marker raced into existence; leaving it");
            return Ok(RestartOutcome::AlreadyPending);
        }
        self.phase = RestartPhase::RestartSignaled;
        self.flow.step(
            FlowStep::RestartSignaled,
            "restart_signaled",
            &json!({
                "agent_name": agent_name,
                "mcp_status": registration.status(),
                "restart_status": "marker_created",
            }),
        );

        if let Some(store) = store {
            if let Err(err) = record_restart(store, &request) {
                tracing::warn!(error = %err, "Could not record restart in session metadata");
            }
        }

        Ok(RestartOutcome::Signaled { registration })
    }
}

fn record_restart(store: &SessionStore, request: &RestartRequest) -> Result<()> {
    store.update_metadata(|metadata| {
        metadata.metrics.restarts += 1;
        metadata.agents.meta.status = GeneratorStatus::RestartTriggered;
        if let Some(key) = &request.completion_key {
            metadata.handled_completions.push(key.clone());
        }
        if let RestartCause::Completion(detection) = &request.cause {
            metadata.metrics.agents_created += 1;
            metadata.agents.meta.creations += 1;
            if let Detection::Signal(created) = detection {
                metadata.agents.specialized.insert(
                    created.agent_name.clone(),
                    SpecializedAgent {
                        purpose: Some(created.purpose.clone()),
                        created: Local::now(),
                        status: SpecializedStatus::PendingRestart,
                    },
                );
            }
        }
    })
}
