//! Best-effort git context for session-start records.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::session::GitContext;

const GIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Branch, dirty file count and last commit subject. `None` outside a
/// repository, when git is missing, or when any command is too slow.
pub fn collect_git_context(dir: &Path) -> Option<GitContext> {
    let branch = run_git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let status = run_git(dir, &["status", "--porcelain"])?;
    let last_commit = run_git(dir, &["log", "-1", "--pretty=%h %s"]).unwrap_or_default();
    Some(GitContext {
        branch: branch.trim().to_string(),
        uncommitted_changes: status.lines().filter(|l| !l.trim().is_empty()).count() as u64,
        last_commit: last_commit.trim().to_string(),
    })
}

fn run_git(dir: &Path, args: &[&str]) -> Option<String> {
    let mut child = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    // git blocks on a full pipe; drain stdout while polling.
    let mut stdout = child.stdout.take()?;
    let reader = thread::spawn(move || {
        let mut buf = String::new();
        stdout.read_to_string(&mut buf).map(|_| buf)
    });

    let deadline = Instant::now() + GIT_TIMEOUT;
    let succeeded = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.success(),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::debug!(?args, "git timed out");
                break false;
            }
            Ok(None) => thread::sleep(Duration::from_millis(20)),
            Err(_) => break false,
        }
    };

    let output = reader.join().ok()?.ok()?;
    succeeded.then_some(output)
}
