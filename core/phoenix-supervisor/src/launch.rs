//! Host command lines and the launcher that spawns them.
//!
//! ```text
//! initial:      <host> --system-prompt-file <tmp> --allowedTools <tool> --permission-mode <mode> [-p @<task tmp>]
//! continuation: <host> --continue <prompt> --allowedTools <tool> --permission-mode <mode>
//! ```
//!
//! The prompt and task temp files live as long as the launcher and are
//! deleted when it drops, whichever way the supervisor exits.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use fs_err as fs;
use phoenix_core::{PhoenixError, Result};
use tempfile::NamedTempFile;

use crate::process::ProcessGroup;
use crate::supervisor::{LaunchMode, Launcher};

const DELEGATION_NOTICE: &str = "\n\n🚨 CRITICAL: You can ONLY use the {tool} tool. All other tools are FORBIDDEN.\n\n\
If you attempt any non-{tool} tool, respond: \"TOOL_VIOLATION: [toolname] - {tool} delegation required\" \
and delegate to meta-agent via the {tool} tool.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    AcceptEdits,
    BypassPermissions,
}

impl PermissionMode {
    pub fn for_headless(headless: bool) -> Self {
        if headless {
            PermissionMode::BypassPermissions
        } else {
            PermissionMode::AcceptEdits
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostCommand {
    pub host_binary: String,
    pub delegation_tool: String,
    pub permission_mode: PermissionMode,
    pub continuation_prompt: String,
}

impl HostCommand {
    pub fn initial_args(
        &self,
        system_prompt_file: &Path,
        task_file: Option<&Path>,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--system-prompt-file".into(), system_prompt_file.into()];
        args.extend(self.restriction_args());
        if let Some(task) = task_file {
            let mut reference = OsString::from("@");
            reference.push(task);
            args.push("-p".into());
            args.push(reference);
        }
        args
    }

    pub fn continuation_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--continue".into(),
            self.continuation_prompt.clone().into(),
        ];
        args.extend(self.restriction_args());
        args
    }

    fn restriction_args(&self) -> Vec<OsString> {
        vec![
            "--allowedTools".into(),
            self.delegation_tool.clone().into(),
            "--permission-mode".into(),
            self.permission_mode.as_str().into(),
        ]
    }
}

/// Renders the primary system prompt with the delegation-only notice appended.
pub fn render_system_prompt(base: &str, delegation_tool: &str) -> String {
    format!("{}{}", base, DELEGATION_NOTICE.replace("{tool}", delegation_tool))
}

pub struct HostLauncher {
    command: HostCommand,
    working_dir: PathBuf,
    headless: bool,
    system_prompt_file: NamedTempFile,
    task_file: Option<NamedTempFile>,
}

impl HostLauncher {
    pub fn new(
        command: HostCommand,
        working_dir: PathBuf,
        system_prompt_path: &Path,
        task: Option<&str>,
        headless: bool,
    ) -> Result<Self> {
        let base = fs::read_to_string(system_prompt_path).map_err(|e| {
            PhoenixError::io(
                format!("reading system prompt {}", system_prompt_path.display()),
                e,
            )
        })?;
        let system_prompt_file = write_temp(
            ".md",
            &render_system_prompt(&base, &command.delegation_tool),
        )?;
        let task_file = task.map(|task| write_temp(".txt", task)).transpose()?;

        Ok(Self {
            command,
            working_dir,
            headless,
            system_prompt_file,
            task_file,
        })
    }

    pub fn system_prompt_path(&self) -> &Path {
        self.system_prompt_file.path()
    }

    pub fn task_path(&self) -> Option<&Path> {
        self.task_file.as_ref().map(|f| f.path())
    }
}

impl Launcher for HostLauncher {
    type Child = ProcessGroup;

    fn launch(&mut self, mode: LaunchMode) -> Result<ProcessGroup> {
        let args = match mode {
            LaunchMode::Initial => self
                .command
                .initial_args(self.system_prompt_path(), self.task_path()),
            LaunchMode::Continuation => self.command.continuation_args(),
        };
        tracing::info!(?mode, host = %self.command.host_binary, "Launching host");

        let mut command = Command::new(&self.command.host_binary);
        command.args(&args).current_dir(&self.working_dir);
        if self.headless {
            command.stdin(Stdio::null());
        }
        let group = ProcessGroup::spawn(command)?;
        tracing::info!(pgid = group.pgid(), program = group.program(), "Host started");
        Ok(group)
    }
}

fn write_temp(suffix: &str, content: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("phoenix-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| PhoenixError::io("creating temp file", e))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| PhoenixError::io("writing temp file", e))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn host_command() -> HostCommand {
        HostCommand {
            host_binary: "claude".to_string(),
            delegation_tool: "Task".to_string(),
            permission_mode: PermissionMode::AcceptEdits,
            continuation_prompt: "meta-agent finished. continue with original task".to_string(),
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn initial_args_restrict_to_delegation_tool() {
        let args = strings(host_command().initial_args(Path::new("/tmp/p.md"), None));
        assert_eq!(
            args,
            [
                "--system-prompt-file",
                "/tmp/p.md",
                "--allowedTools",
                "Task",
                "--permission-mode",
                "acceptEdits"
            ]
        );
    }

    #[test]
    fn initial_args_reference_task_file() {
        let args = strings(
            host_command().initial_args(Path::new("/tmp/p.md"), Some(Path::new("/tmp/t.txt"))),
        );
        assert_eq!(&args[args.len() - 2..], ["-p", "@/tmp/t.txt"]);
    }

    #[test]
    fn continuation_args_resume_conversation() {
        let mut command = host_command();
        command.permission_mode = PermissionMode::for_headless(true);
        let args = strings(command.continuation_args());
        assert_eq!(
            args,
            [
                "--continue",
                "meta-agent finished. continue with original task",
                "--allowedTools",
                "Task",
                "--permission-mode",
                "bypassPermissions"
            ]
        );
    }

    #[test]
    fn temp_files_are_removed_on_drop() {
        let temp = tempdir().unwrap();
        let prompt = temp.path().join("primary_agent.md");
        fs::write(&prompt, "You are the primary agent.").unwrap();

        let launcher = HostLauncher::new(
            host_command(),
            temp.path().to_path_buf(),
            &prompt,
            Some("build a calculator"),
            false,
        )
        .unwrap();
        let prompt_copy = launcher.system_prompt_path().to_path_buf();
        let task_copy = launcher.task_path().unwrap().to_path_buf();

        let rendered = fs::read_to_string(&prompt_copy).unwrap();
        assert!(rendered.starts_with("You are the primary agent."));
        assert!(rendered.contains("You can ONLY use the Task tool"));
        assert_eq!(fs::read_to_string(&task_copy).unwrap(), "build a calculator");

        drop(launcher);
        assert!(!prompt_copy.exists());
        assert!(!task_copy.exists());
    }

    #[test]
    fn missing_system_prompt_is_an_error() {
        let temp = tempdir().unwrap();
        let result = HostLauncher::new(
            host_command(),
            temp.path().to_path_buf(),
            &temp.path().join("missing.md"),
            None,
            false,
        );
        assert!(result.is_err());
    }
}
