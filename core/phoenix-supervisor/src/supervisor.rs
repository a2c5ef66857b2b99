//! The supervisor loop.
//!
//! ```text
//!   launch(Initial) ─► Running ──marker──► TerminationRequested ─► Terminated
//!                        ▲  │                                          │
//!                        │  └─exit──► return code           lock marker set
//!                        │                                             │
//!                        └───────────── Relaunching ◄──────────────────┘
//!                                   launch(Continuation)
//! ```
//!
//! The restart marker is polled with [`wait_for_signal`]; child exit and
//! operator interrupt are folded into its stop predicate. The lock marker is
//! cleared on every way out of [`Supervisor::run`].

use std::time::Duration;

use phoenix_core::{
    wait_for_signal, FlowLog, FlowStep, Marker, ProjectLayout, Result, SignalChannel,
    SupervisorSettings, WaitOutcome,
};
use serde_json::json;

use crate::process::{ProcessGroup, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Cold start with the system prompt and optional task.
    Initial,
    /// Resume the previous conversation.
    Continuation,
}

/// A running host the supervisor can poll and tear down.
pub trait ManagedChild {
    fn try_exit(&mut self) -> Result<Option<i32>>;
    fn terminate(&mut self, grace: Duration) -> Result<Termination>;
}

impl ManagedChild for ProcessGroup {
    fn try_exit(&mut self) -> Result<Option<i32>> {
        ProcessGroup::try_exit(self)
    }

    fn terminate(&mut self, grace: Duration) -> Result<Termination> {
        ProcessGroup::terminate(self, grace)
    }
}

pub trait Launcher {
    type Child: ManagedChild;

    fn launch(&mut self, mode: LaunchMode) -> Result<Self::Child>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    TerminationRequested,
    Terminated,
    Relaunching,
}

pub struct Supervisor<L: Launcher> {
    launcher: L,
    restart_marker: Marker,
    lock_marker: Marker,
    flow: FlowLog,
    poll_interval: Duration,
    grace: Duration,
    interrupt: Box<dyn Fn() -> bool>,
    state: SupervisorState,
    restarts: u32,
}

impl<L: Launcher> Supervisor<L> {
    pub fn new(
        launcher: L,
        layout: &ProjectLayout,
        settings: &SupervisorSettings,
        flow: FlowLog,
    ) -> Self {
        Self {
            launcher,
            restart_marker: Marker::new(layout.restart_marker()),
            lock_marker: Marker::new(layout.lock_marker()),
            flow,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            grace: Duration::from_millis(settings.grace_period_ms),
            interrupt: Box::new(|| false),
            state: SupervisorState::Idle,
            restarts: 0,
        }
    }

    /// Predicate polled alongside the child; returning true tears the child down and exits 0.
    pub fn with_interrupt(mut self, interrupt: impl Fn() -> bool + 'static) -> Self {
        self.interrupt = Box::new(interrupt);
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Runs until the host exits on its own or an interrupt arrives.
    /// Returns the host's exit code, or 0 after an interrupt.
    pub fn run(&mut self) -> Result<i32> {
        self.clear_stale_markers()?;
        let _lock = LockRelease(self.lock_marker.clone());

        let mut child = self.launcher.launch(LaunchMode::Initial)?;
        self.state = SupervisorState::Running;

        loop {
            let mut exited = None;
            let interrupt = &self.interrupt;
            let outcome = wait_for_signal(&self.restart_marker, self.poll_interval, None, || {
                if interrupt() {
                    return true;
                }
                match child.try_exit() {
                    Ok(None) => false,
                    result => {
                        exited = Some(result.map(|code| code.unwrap_or(0)));
                        true
                    }
                }
            });

            match outcome {
                WaitOutcome::Signaled => {
                    child = self.relaunch(child)?;
                }
                WaitOutcome::Stopped => {
                    if let Some(result) = exited {
                        let code = result?;
                        tracing::info!(code, restarts = self.restarts, "Host exited");
                        self.state = SupervisorState::Terminated;
                        return Ok(code);
                    }
                    tracing::info!("Interrupted; stopping host");
                    self.state = SupervisorState::TerminationRequested;
                    child.terminate(self.grace)?;
                    self.state = SupervisorState::Terminated;
                    return Ok(0);
                }
                WaitOutcome::TimedOut => continue,
            }
        }
    }

    fn relaunch(&mut self, mut child: L::Child) -> Result<L::Child> {
        self.restart_marker.consume()?;
        self.state = SupervisorState::TerminationRequested;
        tracing::info!("Restart requested; terminating host");

        let termination = child.terminate(self.grace)?;
        self.state = SupervisorState::Terminated;
        tracing::debug!(?termination, "Host terminated");

        self.lock_marker.create()?;
        self.state = SupervisorState::Relaunching;
        self.restarts += 1;
        self.flow.step(
            FlowStep::Relaunched,
            "relaunched",
            &json!({ "restart_status": format!("relaunch {}", self.restarts) }),
        );

        let child = self.launcher.launch(LaunchMode::Continuation)?;
        self.state = SupervisorState::Running;
        Ok(child)
    }

    fn clear_stale_markers(&self) -> Result<()> {
        for marker in [&self.restart_marker, &self.lock_marker] {
            if marker.remove()? {
                tracing::warn!(path = %marker.path().display(), "Removed stale marker");
            }
        }
        Ok(())
    }
}

struct LockRelease(Marker);

impl Drop for LockRelease {
    fn drop(&mut self) {
        if let Err(err) = self.0.remove() {
            tracing::warn!(error = %err, "Failed to clear lock marker");
        }
    }
}
