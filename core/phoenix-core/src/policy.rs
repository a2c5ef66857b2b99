//! Delegation guard applied by the pre-tool-use hook.
//!
//! Once the lock marker exists, the top-level agent may only call the
//! delegation tool. This enforces an architectural rule ("the top-level agent
//! only delegates"); it is not a sandbox.

use crate::hook::ToolCall;
use crate::markers::Marker;

/// Exit code the host interprets as "block this tool call".
pub const VETO_EXIT_CODE: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Veto { message: String },
}

impl PolicyDecision {
    pub fn is_veto(&self) -> bool {
        matches!(self, PolicyDecision::Veto { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PolicyDecision::Allow => 0,
            PolicyDecision::Veto { .. } => VETO_EXIT_CODE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DelegationGuard {
    delegation_tool: String,
    lock_marker: Marker,
}

impl DelegationGuard {
    pub fn new(delegation_tool: impl Into<String>, lock_marker: Marker) -> Self {
        Self {
            delegation_tool: delegation_tool.into(),
            lock_marker,
        }
    }

    pub fn check(&self, call: &ToolCall) -> PolicyDecision {
        if !call.is_top_level() || call.tool_name == self.delegation_tool {
            return PolicyDecision::Allow;
        }
        if !self.lock_marker.exists() {
            return PolicyDecision::Allow;
        }
        PolicyDecision::Veto {
            message: format!(
                "⛔ Primary agent may only use {tool} tool (attempted {attempted}) - delegate via {tool}",
                tool = self.delegation_tool,
                attempted = call.tool_name
            ),
        }
    }
}
