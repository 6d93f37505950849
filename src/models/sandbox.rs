//! Sandbox representation and lifecycle state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::ServerVersion;
use crate::config::ServerConfig;
use crate::error::{Result, SandboxError};

/// Name of the manifest written at the root of every sandbox
pub const MANIFEST_FILENAME: &str = "sandbox.json";

/// Name of the generated start script
pub const START_SCRIPT_FILENAME: &str = "start.sh";

/// Longest path a Unix domain socket can bind to
pub const MAX_SOCKET_PATH: usize = 107;

/// Lifecycle state of a sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    /// Nothing on disk yet
    Unprovisioned,
    /// Skeleton created and distribution extracted
    Extracted,
    /// Config file and start script written
    Configured,
    /// System tables bootstrapped
    Initialized,
    /// Start script launched, waiting for the pid file
    Starting,
    /// Pid file present
    Running,
    /// Server process signaled
    Stopped,
    /// Sandbox tree deleted
    Removed,
}

impl SandboxState {
    /// The state that follows this one on the normal path
    fn successor(self) -> Option<Self> {
        match self {
            Self::Unprovisioned => Some(Self::Extracted),
            Self::Extracted => Some(Self::Configured),
            Self::Configured => Some(Self::Initialized),
            Self::Initialized => Some(Self::Starting),
            Self::Starting => Some(Self::Running),
            Self::Running => Some(Self::Stopped),
            Self::Stopped => Some(Self::Removed),
            Self::Removed => None,
        }
    }

    /// Whether `self -> to` is a legal transition
    pub fn can_transition(self, to: Self) -> bool {
        to == Self::Removed || self.successor() == Some(to)
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unprovisioned => "unprovisioned",
            Self::Extracted => "extracted",
            Self::Configured => "configured",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// Paths derived from the sandbox root, fixed at provisioning time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPaths {
    /// Install directory, `<root>/<version>`
    pub basedir: PathBuf,
    /// Data directory, `<root>/data`
    pub datadir: PathBuf,
    /// Temp directory, `<root>/tmp`
    pub tmpdir: PathBuf,
    /// Pid file inside the data directory
    pub pid_file: PathBuf,
    /// Listen socket inside the data directory
    pub socket: PathBuf,
    /// Server configuration file
    pub config_file: PathBuf,
    /// Generated start script
    pub start_script: PathBuf,
}

impl SandboxPaths {
    /// Derive every path for a sandbox rooted at `root`
    pub fn derive(root: &Path, version: &ServerVersion, server: &ServerConfig) -> Self {
        let datadir = root.join("data");
        Self {
            basedir: root.join(version.as_str()),
            pid_file: datadir.join(&server.pid_filename),
            socket: datadir.join(&server.socket_filename),
            datadir,
            tmpdir: root.join("tmp"),
            config_file: root.join(&server.config_filename),
            start_script: root.join(START_SCRIPT_FILENAME),
        }
    }

    /// Whether the socket path is too long for the server to bind
    pub fn socket_too_long(&self) -> bool {
        self.socket.as_os_str().len() > MAX_SOCKET_PATH
    }
}

/// What an external harness needs to reach a running sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Unix socket path
    pub socket: PathBuf,
    /// TCP port
    pub port: u16,
}

/// An isolated server instance confined to its own directory tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    /// Absolute root directory, the sandbox identity
    pub root: PathBuf,
    /// Server version parsed from the archive name
    pub version: ServerVersion,
    /// Listen port, also used as the replication server-id
    pub port: u16,
    /// Distribution archive this sandbox was provisioned from
    pub archive: PathBuf,
    /// Derived paths
    pub paths: SandboxPaths,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state
    pub state: SandboxState,
}

impl Sandbox {
    /// Create an unprovisioned sandbox description.
    ///
    /// A relative `root` is resolved against the current directory. Unix
    /// sockets cannot bind to paths longer than [`MAX_SOCKET_PATH`] bytes; a
    /// root deep enough to exceed that is logged as a warning here, and the
    /// server itself will fail to listen on the socket once started. Check
    /// [`SandboxPaths::socket_too_long`] to refuse such roots up front.
    pub fn new(
        root: impl AsRef<Path>,
        archive: impl AsRef<Path>,
        version: ServerVersion,
        port: u16,
        server: &ServerConfig,
    ) -> Result<Self> {
        let root = absolute(root.as_ref())?;
        let paths = SandboxPaths::derive(&root, &version, server);

        if paths.socket_too_long() {
            tracing::warn!(
                "Socket path {} is {} bytes, longer than the {} byte limit",
                paths.socket.display(),
                paths.socket.as_os_str().len(),
                MAX_SOCKET_PATH
            );
        }

        Ok(Self {
            root,
            version,
            port,
            archive: archive.as_ref().to_path_buf(),
            paths,
            created_at: Utc::now(),
            state: SandboxState::Unprovisioned,
        })
    }

    /// Replication server-id, same value as the port
    pub fn server_id(&self) -> u32 {
        u32::from(self.port)
    }

    /// Connection parameters for external callers
    pub fn connection(&self) -> ConnectionParams {
        ConnectionParams {
            socket: self.paths.socket.clone(),
            port: self.port,
        }
    }

    /// Move to the next lifecycle state
    pub fn advance(&mut self, to: SandboxState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(SandboxError::InvalidTransition {
                root: self.root.clone(),
                from: self.state,
                to,
            });
        }
        tracing::debug!("{}: {} -> {}", self.root.display(), self.state, to);
        self.state = to;
        Ok(())
    }

    /// Fail unless the sandbox is currently in `expected`
    pub fn expect_state(&self, expected: SandboxState, next: SandboxState) -> Result<()> {
        if self.state != expected {
            return Err(SandboxError::InvalidTransition {
                root: self.root.clone(),
                from: self.state,
                to: next,
            });
        }
        Ok(())
    }

    /// Path of the manifest file
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILENAME)
    }

    /// Persist this sandbox's description under its root
    pub fn save_manifest(&self) -> Result<()> {
        let path = self.manifest_path();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content).map_err(|e| SandboxError::io("write manifest", &path, e))
    }

    /// Reopen a sandbox from its manifest.
    ///
    /// The pid file is the source of truth for liveness: if it exists the
    /// sandbox is reported as running whatever state was last persisted.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = absolute(root.as_ref())?;
        let path = root.join(MANIFEST_FILENAME);

        if !path.exists() {
            return Err(SandboxError::NotASandbox { root });
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| SandboxError::io("read manifest", &path, e))?;
        let mut sandbox: Sandbox = serde_json::from_str(&content)?;

        if sandbox.paths.pid_file.exists() {
            sandbox.state = SandboxState::Running;
        } else if matches!(sandbox.state, SandboxState::Starting | SandboxState::Running) {
            sandbox.state = SandboxState::Initialized;
        }

        Ok(sandbox)
    }

    /// Whether the pid file currently exists
    pub fn is_running(&self) -> bool {
        self.paths.pid_file.exists()
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
