//! Registration of generated tool servers with the host.
//!
//! Best-effort: a failed registration is reported, never raised. The restart
//! goes ahead either way.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::PhoenixError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    pub attempted: usize,
    pub registered: usize,
    pub failures: Vec<String>,
}

impl RegistrationReport {
    /// Short status for the flow log.
    pub fn status(&self) -> String {
        if self.attempted == 0 {
            "skipped".to_string()
        } else if self.failures.is_empty() {
            format!("registered {}/{}", self.registered, self.attempted)
        } else {
            format!(
                "registered {}/{} ({} failed)",
                self.registered,
                self.attempted,
                self.failures.len()
            )
        }
    }
}

pub trait Registrar {
    fn register(&self, servers: &[PathBuf]) -> RegistrationReport;
}

/// Registration disabled.
pub struct NoopRegistrar;

impl Registrar for NoopRegistrar {
    fn register(&self, _servers: &[PathBuf]) -> RegistrationReport {
        RegistrationReport::default()
    }
}

/// Runs `<host> mcp add <name> -- <interpreter> <path>` per server file,
/// from the project root so the host's local scope is that project.
pub struct HostCliRegistrar {
    host_binary: String,
    interpreter: String,
    working_dir: PathBuf,
}

impl HostCliRegistrar {
    pub fn new(
        host_binary: impl Into<String>,
        interpreter: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host_binary: host_binary.into(),
            interpreter: interpreter.into(),
            working_dir: working_dir.into(),
        }
    }

    fn register_one(&self, server: &Path) -> Result<(), PhoenixError> {
        let name = server_name(server)
            .ok_or_else(|| PhoenixError::RegistrationFailed(format!("{}", server.display())))?;
        let absolute = fs_err::canonicalize(server).unwrap_or_else(|_| server.to_path_buf());

        let output = Command::new(&self.host_binary)
            .args(["mcp", "add", &name, "--", &self.interpreter])
            .arg(&absolute)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|e| PhoenixError::LaunchFailed {
                program: self.host_binary.clone(),
                source: e,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_lowercase().contains("already exists") {
            tracing::debug!(server = %name, "Tool server already registered");
            return Ok(());
        }
        Err(PhoenixError::RegistrationFailed(format!(
            "{}: {}",
            name,
            stderr.trim()
        )))
    }
}

impl Registrar for HostCliRegistrar {
    fn register(&self, servers: &[PathBuf]) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        for server in servers {
            report.attempted += 1;
            match self.register_one(server) {
                Ok(()) => report.registered += 1,
                Err(err) => {
                    tracing::warn!(server = %server.display(), error = %err, "Tool registration failed");
                    report.failures.push(err.to_string());
                }
            }
        }
        report
    }
}

/// `calc_server.py` -> `calc-server`. Dunder files are never registered.
pub fn server_name(server: &Path) -> Option<String> {
    let stem = server.file_stem()?.to_str()?;
    if stem.is_empty() || stem.starts_with("__") {
        return None;
    }
    Some(stem.replace('_', "-"))
}
