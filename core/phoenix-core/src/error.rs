//! Error types for phoenix-core operations.

use std::path::PathBuf;

/// All errors that can occur in phoenix-core operations.
///
/// Hook dispatchers never surface these to the host process: they are logged
/// and converted to an "allow" exit. The supervisor propagates launch errors.
#[derive(Debug, thiserror::Error)]
pub enum PhoenixError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid restart policy: {0}")]
    InvalidPolicy(String),

    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Session metadata missing: {0}")]
    MetadataMissing(PathBuf),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to launch {program}: {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signal delivery failed for process group {pgid}: {source}")]
    SignalFailed {
        pgid: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("Tool registration failed: {0}")]
    RegistrationFailed(String),
}

impl PhoenixError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PhoenixError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        PhoenixError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using PhoenixError.
pub type Result<T> = std::result::Result<T, PhoenixError>;
