//! Zero-byte marker files and the polling wait built on them.
//!
//! A marker's existence is its whole state. The restart marker is created by
//! hook processes and consumed by the supervisor; the lock marker is created
//! by the supervisor after the first restart and read by the delegation guard.
//!
//! [`wait_for_signal`] is the only place that polls. It takes any
//! [`SignalChannel`], so a pipe or socket channel can replace file polling
//! without touching the supervisor loop.

use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs_err as fs;
use fs_err::OpenOptions;

use crate::error::{PhoenixError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    path: PathBuf,
}

impl Marker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates the marker. Returns false if it was already present.
    pub fn create(&self) -> Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(PhoenixError::io(
                format!("creating marker {}", self.path.display()),
                e,
            )),
        }
    }

    /// Deletes the marker. Returns false if it was not present.
    pub fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PhoenixError::io(
                format!("removing marker {}", self.path.display()),
                e,
            )),
        }
    }
}

/// A boolean cross-process signal that can be observed and consumed.
pub trait SignalChannel {
    fn is_signaled(&self) -> bool;

    /// Clears the signal. Returns true if this call consumed it.
    fn consume(&self) -> Result<bool>;
}

impl SignalChannel for Marker {
    fn is_signaled(&self) -> bool {
        self.exists()
    }

    fn consume(&self) -> Result<bool> {
        self.remove()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    /// The stop predicate returned true before any signal.
    Stopped,
    TimedOut,
}

/// Polls `signal` every `poll_interval` until it is raised, `stop` returns
/// true, or `timeout` (if any) elapses. The signal is checked before `stop`
/// on every round. Does not consume the signal.
pub fn wait_for_signal<S, F>(
    signal: &S,
    poll_interval: Duration,
    timeout: Option<Duration>,
    mut stop: F,
) -> WaitOutcome
where
    S: SignalChannel + ?Sized,
    F: FnMut() -> bool,
{
    let started = Instant::now();
    loop {
        if signal.is_signaled() {
            return WaitOutcome::Signaled;
        }
        if stop() {
            return WaitOutcome::Stopped;
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                return WaitOutcome::TimedOut;
            }
        }
        thread::sleep(poll_interval);
    }
}
