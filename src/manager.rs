//! The sandbox lifecycle manager
//!
//! Ties the provisioner, configurator, initializer and supervisor together
//! behind the two requests external harnesses make: "give me a running
//! sandbox" and "tear it down".

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::configure::Configurator;
use crate::error::Result;
use crate::initialize::Initializer;
use crate::models::{ConnectionParams, Sandbox, ServerVersion};
use crate::provision::Provisioner;
use crate::supervisor::Supervisor;

/// Options for creating a sandbox
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Port override; defaults to the port derived from the version
    pub port: Option<u16>,
    /// Stop after initialization instead of starting the server
    pub no_start: bool,
    /// Extra arguments forwarded to the daemon launcher
    pub launcher_args: Vec<String>,
}

/// Drives sandboxes through their lifecycle
pub struct SandboxManager {
    config: Config,
}

impl SandboxManager {
    /// Create a manager with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Default root for a sandbox of the given archive under the sandbox root
    pub fn default_root(&self, archive: &Path, name: Option<&str>) -> Result<PathBuf> {
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let version = ServerVersion::from_archive(archive)?;
                format!("mysql_{}", version)
            }
        };
        Ok(self.config.sandbox_root().join(name))
    }

    /// Provision, configure and initialize a sandbox, then start it unless
    /// `no_start` is set.
    pub fn create(&self, archive: &Path, root: &Path, options: &CreateOptions) -> Result<Sandbox> {
        let server = &self.config.server;

        let mut sandbox = Provisioner::new(server).provision(archive, root, options.port)?;
        Configurator::new(server).configure(&mut sandbox)?;
        Initializer::new(server).initialize(&mut sandbox)?;

        if !options.no_start {
            self.supervisor().start(&mut sandbox, &options.launcher_args)?;
        }

        Ok(sandbox)
    }

    /// Start an already initialized sandbox
    pub fn start(&self, root: &Path, launcher_args: &[String]) -> Result<ConnectionParams> {
        let mut sandbox = Sandbox::open(root)?;
        self.supervisor().start(&mut sandbox, launcher_args)
    }

    /// Stop and remove the sandbox at `root`.
    ///
    /// Works from the manifest when there is one, otherwise from the root
    /// path and pid file location alone.
    pub fn destroy(&self, root: &Path) -> Result<()> {
        match Sandbox::open(root) {
            Ok(mut sandbox) => self.supervisor().stop(&mut sandbox),
            Err(crate::SandboxError::NotASandbox { .. }) => self.supervisor().teardown(root),
            Err(e) => {
                tracing::warn!("Unreadable manifest under {}: {}", root.display(), e);
                self.supervisor().teardown(root)
            }
        }
    }

    /// Reopen the sandbox at `root`
    pub fn open(&self, root: &Path) -> Result<Sandbox> {
        Sandbox::open(root)
    }

    /// Environment a test harness needs to talk to the sandbox
    pub fn environment(&self, sandbox: &Sandbox) -> Vec<(String, String)> {
        let path = match std::env::var("PATH") {
            Ok(path) if !path.is_empty() => {
                format!("{}:{}", sandbox.paths.basedir.join("bin").display(), path)
            }
            _ => sandbox.paths.basedir.join("bin").display().to_string(),
        };

        vec![
            ("HOME".to_string(), sandbox.root.display().to_string()),
            ("PATH".to_string(), path),
            (
                "MYSQL_UNIX_PORT".to_string(),
                sandbox.paths.socket.display().to_string(),
            ),
            ("MYSQL_TCP_PORT".to_string(), sandbox.port.to_string()),
        ]
    }

    fn supervisor(&self) -> Supervisor<'_> {
        Supervisor::new(&self.config.server, &self.config.timing)
    }
}
