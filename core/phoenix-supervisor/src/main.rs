//! phoenix: launches the host assistant restricted to delegation and
//! relaunches it, resuming the conversation, whenever a hook signals that a
//! newly generated agent needs a fresh process to load.

mod interrupt;
mod launch;
mod process;
mod supervisor;

use std::env;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use phoenix_core::{FlowLog, PhoenixConfig, ProjectLayout, DEBUG_LOG_ENV};
use tracing_subscriber::EnvFilter;

use crate::launch::{HostCommand, HostLauncher, PermissionMode};
use crate::supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "phoenix")]
#[command(about = "Supervise the host assistant and relaunch it when new agents are generated")]
#[command(version)]
struct Cli {
    /// Task to run
    task: Option<String>,

    /// Start without a task
    #[arg(long)]
    interactive: bool,

    /// Non-interactive run: bypass permission prompts, launcher output on stderr
    #[arg(long)]
    headless: bool,

    /// Host executable (overrides config)
    #[arg(long, value_name = "PATH")]
    host_binary: Option<String>,

    /// Primary agent system prompt
    #[arg(long, value_name = "FILE")]
    system_prompt: Option<PathBuf>,

    /// Project root (defaults to $CLAUDE_PROJECT_DIR, then the current directory)
    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Wait between SIGTERM and SIGKILL
    #[arg(long, value_name = "MS")]
    grace_ms: Option<u64>,
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    if cli.task.is_none() && !cli.interactive {
        let _ = Cli::command().print_help();
        return;
    }

    std::process::exit(run(cli));
}

fn init_logging() {
    let debug_enabled = env::var(DEBUG_LOG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> i32 {
    let layout = ProjectLayout::discover(cli.project_dir.as_deref());
    let mut config = PhoenixConfig::load(&layout);
    if let Some(host) = cli.host_binary {
        config.host_binary = host;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.supervisor.poll_interval_ms = ms;
    }
    if let Some(ms) = cli.grace_ms {
        config.supervisor.grace_period_ms = ms;
    }

    let system_prompt = cli
        .system_prompt
        .unwrap_or_else(|| layout.default_system_prompt());
    let command = HostCommand {
        host_binary: config.host_binary.clone(),
        delegation_tool: config.delegation_tool.clone(),
        permission_mode: PermissionMode::for_headless(cli.headless),
        continuation_prompt: config.continuation_prompt.clone(),
    };
    let launcher = match HostLauncher::new(
        command,
        layout.root().to_path_buf(),
        &system_prompt,
        cli.task.as_deref(),
        cli.headless,
    ) {
        Ok(launcher) => launcher,
        Err(err) => {
            eprintln!("phoenix: {}", err);
            return 1;
        }
    };

    if let Err(err) = interrupt::install() {
        tracing::warn!(error = %err, "Could not install interrupt handler");
    }
    if !cli.headless {
        println!(
            "phoenix: supervising {} in {}",
            config.host_binary,
            layout.root().display()
        );
    }

    let flow = FlowLog::to_file(layout.flow_log());
    let mut supervisor = Supervisor::new(launcher, &layout, &config.supervisor, flow)
        .with_interrupt(interrupt::requested);
    match supervisor.run() {
        Ok(code) => {
            tracing::info!(code, restarts = supervisor.restarts(), "Supervisor finished");
            code
        }
        Err(err) => {
            tracing::error!(error = %err, state = ?supervisor.state(), "Supervisor failed");
            eprintln!("phoenix: {}", err);
            1
        }
    }
}
