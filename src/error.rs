//! Error types for dbsandbox

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

use crate::models::SandboxState;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{step} failed for {path}: {source}")]
    IoAt {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Cannot derive server version from archive name: {path}")]
    InvalidArchiveName { path: PathBuf },

    #[error("Cannot derive a port from version '{version}'")]
    PortDerivation { version: String },

    #[error("Failed to extract {archive}: {message}")]
    Extraction { archive: PathBuf, message: String },

    #[error("Tool not found: {tool} (args: {})", .args.join(" "))]
    ToolNotFound { tool: PathBuf, args: Vec<String> },

    #[error("Tool {tool} exited with {status} (args: {})", .args.join(" "))]
    ToolFailed {
        tool: PathBuf,
        args: Vec<String>,
        status: ExitStatus,
    },

    #[error("Start script for sandbox {root} failed: {message}")]
    LaunchFailed { root: PathBuf, message: String },

    #[error(
        "Sandbox {root} not ready after {waited_ms} ms (no pid file at {pid_file}); inspect logs under the sandbox root"
    )]
    ReadinessTimeout {
        root: PathBuf,
        pid_file: PathBuf,
        waited_ms: u128,
    },

    #[error("Sandbox already running (found pid file {pid_file})")]
    AlreadyRunning { pid_file: PathBuf },

    #[error("Failed to remove sandbox {root}: {source}")]
    Teardown {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sandbox {root} cannot go from {from} to {to}")]
    InvalidTransition {
        root: PathBuf,
        from: SandboxState,
        to: SandboxState,
    },

    #[error("No sandbox manifest found under {root}")]
    NotASandbox { root: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

impl SandboxError {
    /// Wrap an IO error with the step and path it happened at
    pub fn io(step: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            step,
            path: path.into(),
            source,
        }
    }

    /// Create a new extraction error
    pub fn extract(archive: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Extraction {
            archive: archive.into(),
            message: msg.into(),
        }
    }

    /// Whether the outcome of a start is unknown rather than a definite failure
    pub fn is_readiness_timeout(&self) -> bool {
        matches!(self, Self::ReadinessTimeout { .. })
    }
}
