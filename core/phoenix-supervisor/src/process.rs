//! Process-group ownership for the host process.
//!
//! The host is started as the leader of a new session (and so of a new process
//! group), so one `killpg` reaches every descendant it spawned. Termination is
//! SIGTERM to the group, a bounded wait for the leader, then SIGKILL.

use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use phoenix_core::{PhoenixError, Result};

const REAP_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Leader exited within the grace period.
    Graceful,
    /// Grace period elapsed; the group was killed.
    Killed,
    /// Leader had already exited.
    AlreadyExited,
}

pub struct ProcessGroup {
    child: Child,
    pgid: i32,
    program: String,
}

impl ProcessGroup {
    pub fn spawn(mut command: Command) -> Result<Self> {
        let program = command.get_program().to_string_lossy().into_owned();
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        #[allow(unsafe_code)]
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        let child = command.spawn().map_err(|e| PhoenixError::LaunchFailed {
            program: program.clone(),
            source: e,
        })?;
        let pgid = child.id() as i32;
        tracing::debug!(pid = pgid, program = %program, "Spawned process group");
        Ok(Self {
            child,
            pgid,
            program,
        })
    }

    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Exit code if the leader has exited. Death by signal maps to 128 + signal.
    pub fn try_exit(&mut self) -> Result<Option<i32>> {
        self.child
            .try_wait()
            .map(|status| status.map(exit_code))
            .map_err(|e| PhoenixError::io(format!("polling {}", self.program), e))
    }

    /// Sends `signal` to every process in the group. A vanished group is not an error.
    pub fn signal(&self, signal: libc::c_int) -> Result<()> {
        // SAFETY: killpg only delivers a signal; pgid came from our own spawn.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::killpg(self.pgid, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(PhoenixError::SignalFailed {
            pgid: self.pgid,
            source: err,
        })
    }

    pub fn terminate(&mut self, grace: Duration) -> Result<Termination> {
        let already_exited = self.try_exit()?.is_some();
        self.signal(libc::SIGTERM)?;
        if already_exited {
            return Ok(Termination::AlreadyExited);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.try_exit()?.is_some() {
                tracing::debug!(pgid = self.pgid, "Process group exited after SIGTERM");
                return Ok(Termination::Graceful);
            }
            thread::sleep(REAP_POLL);
        }

        tracing::warn!(pgid = self.pgid, ?grace, "Grace period elapsed; sending SIGKILL");
        self.signal(libc::SIGKILL)?;
        self.child
            .wait()
            .map_err(|e| PhoenixError::io(format!("reaping {}", self.program), e))?;
        Ok(Termination::Killed)
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(script);
        command
    }

    /// Zombies awaiting reaping by init count as dead.
    fn alive(pid: i32) -> bool {
        // SAFETY: signal 0 only checks for existence.
        #[allow(unsafe_code)]
        let exists = unsafe { libc::kill(pid, 0) == 0 };
        if !exists {
            return false;
        }
        match fs_err::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z"),
            Err(_) => true,
        }
    }

    #[test]
    fn reports_exit_code() {
        let mut group = ProcessGroup::spawn(sh("exit 7")).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let code = loop {
            if let Some(code) = group.try_exit().unwrap() {
                break code;
            }
            assert!(Instant::now() < deadline, "child never exited");
            thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(code, 7);
    }

    #[test]
    fn child_leads_its_own_group() {
        let group = ProcessGroup::spawn(sh("sleep 5")).unwrap();
        // SAFETY: getpgid only reads process state.
        #[allow(unsafe_code)]
        let pgid = unsafe { libc::getpgid(group.pgid()) };
        assert_eq!(pgid, group.pgid());
        let mut group = group;
        group.terminate(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn sigterm_stops_cooperative_child() {
        let mut group = ProcessGroup::spawn(sh("sleep 30")).unwrap();
        let outcome = group.terminate(Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, Termination::Graceful);
        assert!(group.try_exit().unwrap().is_some());
    }

    #[test]
    fn sigkill_after_grace_for_stubborn_child() {
        let mut group =
            ProcessGroup::spawn(sh("trap '' TERM; while true; do sleep 0.05; done")).unwrap();
        thread::sleep(Duration::from_millis(100));
        let outcome = group.terminate(Duration::from_millis(300)).unwrap();
        assert_eq!(outcome, Termination::Killed);
    }

    #[test]
    fn terminate_reaches_grandchildren() {
        let temp = tempfile::tempdir().unwrap();
        let pid_file = temp.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());
        let mut group = ProcessGroup::spawn(sh(&script)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let grandchild: i32 = loop {
            if let Ok(text) = fs_err::read_to_string(&pid_file) {
                if let Ok(pid) = text.trim().parse() {
                    break pid;
                }
            }
            assert!(Instant::now() < deadline, "grandchild never started");
            thread::sleep(Duration::from_millis(20));
        };

        group.terminate(Duration::from_secs(2)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while alive(grandchild) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!alive(grandchild));
    }

    #[test]
    fn missing_program_is_launch_failure() {
        let result = ProcessGroup::spawn(Command::new("/nonexistent/phoenix-host"));
        assert!(matches!(result, Err(PhoenixError::LaunchFailed { .. })));
    }
}
