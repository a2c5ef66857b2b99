use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

struct SupervisorGuard {
    child: Child,
}

impl SupervisorGuard {
    fn wait(&mut self, timeout: Duration) -> i32 {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait().expect("Failed to poll phoenix") {
                return status.code().expect("phoenix exited by signal");
            }
            sleep(Duration::from_millis(25));
        }
        panic!("Timed out waiting for phoenix to exit");
    }
}

impl Drop for SupervisorGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct Project {
    root: TempDir,
    home: TempDir,
}

impl Project {
    fn new() -> Self {
        let project = Self {
            root: TempDir::new().expect("project dir"),
            home: TempDir::new().expect("home dir"),
        };
        fs_err::write(project.system_prompt(), "You are the primary agent.").unwrap();
        project
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    fn system_prompt(&self) -> PathBuf {
        self.home.path().join("primary_agent.md")
    }

    /// Writes an executable stub host and returns its path.
    fn stub_host(&self, body: &str) -> PathBuf {
        let path = self.home.path().join("stub-host.sh");
        fs_err::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs_err::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn command(&self, host: &Path) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_phoenix"));
        command
            .arg("--project-dir")
            .arg(self.root.path())
            .arg("--host-binary")
            .arg(host)
            .arg("--system-prompt")
            .arg(self.system_prompt())
            .arg("--poll-interval-ms")
            .arg("50")
            .arg("--grace-ms")
            .arg("2000")
            .arg("--headless")
            .env("HOME", self.home.path())
            .env_remove("CLAUDE_PROJECT_DIR");
        command
    }

    fn spawn(&self, host: &Path, task: &str) -> SupervisorGuard {
        let child = self
            .command(host)
            .arg(task)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn phoenix");
        SupervisorGuard { child }
    }

    /// Reads a `date +%s%N` stamp written by a stub host.
    fn stamp_nanos(&self, name: &str) -> u128 {
        let raw = fs_err::read_to_string(self.path(name)).expect("stamp file");
        raw.trim().parse().expect("nanosecond stamp")
    }

    fn launches(&self) -> Vec<String> {
        fs_err::read_to_string(self.path("launches.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[test]
fn restart_marker_triggers_one_relaunch_with_continuation() {
    let project = Project::new();
    // First launch: raise the restart marker, then idle until terminated.
    // Second launch: note whether the lock marker is present and exit 3.
    // Both stamp nanosecond times so the relaunch latency can be bounded.
    let host = project.stub_host(
        r#"echo "$@" >> launches.log
if [ "$(wc -l < launches.log)" -eq 1 ]; then
  sleep 0.2
  : > .restart_needed
  date +%s%N > marker_at.log
  sleep 30
else
  date +%s%N > relaunched_at.log
  if [ -e .primary_locked ]; then echo locked > lock_seen.log; fi
  exit 3
fi
"#,
    );

    let mut phoenix = project.spawn(&host, "build a calculator");
    let code = phoenix.wait(Duration::from_secs(20));

    assert_eq!(code, 3);
    let launches = project.launches();
    assert_eq!(launches.len(), 2, "launches: {:?}", launches);
    assert!(launches[0].starts_with("--system-prompt-file "));
    assert!(launches[0].contains("--allowedTools Task"));
    assert!(launches[0].contains("--permission-mode bypassPermissions"));
    assert!(launches[0].contains("-p @"));
    assert!(launches[1].starts_with("--continue meta-agent finished"));
    assert!(launches[1].contains("--allowedTools Task"));

    assert!(project.path("lock_seen.log").exists());
    assert!(!project.path(".restart_needed").exists());
    assert!(!project.path(".primary_locked").exists());

    let flow = fs_err::read_to_string(project.path("flow_progress.log")).expect("flow log");
    assert_eq!(flow.matches("[STEP-4]").count(), 1);

    // The stub dies on SIGTERM, so the relaunch lands a few poll ticks after
    // the marker and well inside the 2000 ms grace.
    let marker_at = project.stamp_nanos("marker_at.log");
    let relaunched_at = project.stamp_nanos("relaunched_at.log");
    let gap_ms = relaunched_at.saturating_sub(marker_at) / 1_000_000;
    assert!(gap_ms < 1500, "relaunch took {} ms after the marker", gap_ms);
}

#[test]
fn host_exit_code_is_propagated() {
    let project = Project::new();
    let host = project.stub_host("echo \"$@\" >> launches.log\nexit 5\n");

    let mut phoenix = project.spawn(&host, "task");
    assert_eq!(phoenix.wait(Duration::from_secs(10)), 5);
    assert_eq!(project.launches().len(), 1);
    assert!(!project.path("flow_progress.log").exists());
}

#[test]
fn missing_system_prompt_exits_one() {
    let project = Project::new();
    let host = project.stub_host("exit 0\n");
    fs_err::remove_file(project.system_prompt()).unwrap();

    let output: Output = project
        .command(&host)
        .arg("task")
        .output()
        .expect("Failed to run phoenix");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("system prompt"));
}

#[test]
fn no_task_without_interactive_prints_help() {
    let project = Project::new();
    let host = project.stub_host("echo launched >> launches.log\n");

    let output = project
        .command(&host)
        .output()
        .expect("Failed to run phoenix");
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
    assert!(project.launches().is_empty());
}
