//! phoenix-hook: hook dispatcher for phoenix-supervised assistant sessions.
//!
//! Invoked by the host once per lifecycle event with one JSON object on stdin.
//! Records the event in the session log and, when the generator sub-agent has
//! produced a new agent, leaves the restart marker for the supervisor.
//!
//! ## Subcommands
//!
//! - `handle`: dispatch on the payload's `hook_event_name`
//! - `session-start`, `user-prompt-submit`, `pre-tool-use`, `post-tool-use`,
//!   `subagent-stop`, `stop`: force a specific dispatcher

mod context;
mod handle;
mod logging;
mod session_start;
mod session_stop;
mod subagent_stop;
mod tool_use;
mod user_prompt;

#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use phoenix_core::{HookKind, ProjectLayout};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "phoenix-hook")]
#[command(about = "Session logging and restart signaling hooks")]
#[command(version)]
struct Cli {
    /// Project root (defaults to $CLAUDE_PROJECT_DIR, then the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch on the payload's hook_event_name (reads JSON from stdin)
    Handle,
    /// Allocate the session directory and metadata
    SessionStart,
    /// Record a submitted prompt
    UserPromptSubmit,
    /// Record a tool call; vetoes non-delegation calls under lock (exit 2)
    PreToolUse,
    /// Record a tool result; watches generator output for completion
    PostToolUse,
    /// Detect generator completion and signal a restart
    SubagentStop,
    /// Mark the session completed
    Stop,
}

impl Commands {
    fn kind(&self) -> Option<HookKind> {
        match self {
            Commands::Handle => None,
            Commands::SessionStart => Some(HookKind::SessionStart),
            Commands::UserPromptSubmit => Some(HookKind::UserPromptSubmit),
            Commands::PreToolUse => Some(HookKind::PreToolUse),
            Commands::PostToolUse => Some(HookKind::PostToolUse),
            Commands::SubagentStop => Some(HookKind::SubagentStop),
            Commands::Stop => Some(HookKind::SessionStop),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let layout = ProjectLayout::discover(cli.project_dir.as_deref());
    let logging_guard = logging::init(&layout);

    let code = handle::run(layout, cli.command.kind());
    // process::exit skips destructors; flush buffered log lines first.
    drop(logging_guard);
    std::process::exit(code);
}
