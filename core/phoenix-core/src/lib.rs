//! # phoenix-core
//!
//! Shared logic for the phoenix hook dispatcher and supervisor: session event
//! persistence, completion detection, restart coordination and the marker
//! files the two processes communicate through.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Hooks are short-lived processes and the
//!   supervisor is a single polling loop.
//! - **Filesystem is the IPC**: Hooks and supervisor share no memory; markers
//!   and JSON files under the project root are the only shared state.
//! - **Graceful degradation**: Missing or corrupt files read as empty/default.
//!   Hook-side failures never block the host.
//! - **Single source of paths**: Every shared path comes from [`ProjectLayout`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use phoenix_core::{ProjectLayout, SessionResolver, SessionStore};
//!
//! let layout = ProjectLayout::discover(None);
//! if let Some(dir) = SessionResolver::new(&layout).resolve("session-id") {
//!     let events = SessionStore::open(dir).read_events();
//! }
//! ```

pub mod completion;
pub mod config;
pub mod error;
pub mod flow;
pub mod git;
pub mod hook;
pub mod markers;
pub mod patterns;
pub mod policy;
pub mod registration;
pub mod restart;
pub mod session;
pub mod storage;

pub use completion::{detect_signal, AgentCreated, ArtifactProbe, CompletionDetector, Detection};
pub use config::*;
pub use error::{PhoenixError, Result};
pub use flow::{FileSink, FlowLog, FlowSink, FlowStep, StderrSink};
pub use git::collect_git_context;
pub use hook::{response_text, HookEvent, HookInput, HookKind, ToolCall};
pub use markers::{wait_for_signal, Marker, SignalChannel, WaitOutcome};
pub use policy::{DelegationGuard, PolicyDecision, VETO_EXIT_CODE};
pub use registration::{HostCliRegistrar, NoopRegistrar, Registrar, RegistrationReport};
pub use restart::{
    RestartCause, RestartCoordinator, RestartOutcome, RestartPhase, RestartPolicy, RestartRequest,
};
pub use session::*;
pub use storage::*;
