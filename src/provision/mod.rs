//! Directory skeleton creation and distribution extraction

mod extract;

pub use extract::{extract_stripped, Compression};

use std::io::ErrorKind;
use std::path::Path;

use crate::config::ServerConfig;
use crate::error::{Result, SandboxError};
use crate::models::{Sandbox, SandboxState, ServerVersion};

/// Lays out a fresh sandbox tree and unpacks a distribution into it
pub struct Provisioner<'a> {
    server: &'a ServerConfig,
}

impl<'a> Provisioner<'a> {
    /// Create a provisioner using the given server layout
    pub fn new(server: &'a ServerConfig) -> Self {
        Self { server }
    }

    /// Provision `root` from `archive`.
    ///
    /// Any existing tree at `root` is removed first, so calling this twice at
    /// the same root yields the same skeleton. The port defaults to the one
    /// derived from the archive's version.
    pub fn provision(&self, archive: &Path, root: &Path, port: Option<u16>) -> Result<Sandbox> {
        let version = ServerVersion::from_archive(archive)?;
        let port = match port {
            Some(port) => port,
            None => version.derived_port()?,
        };

        let mut sandbox = Sandbox::new(root, archive, version, port, self.server)?;
        tracing::info!(
            "Provisioning {} (version {}) from {}",
            sandbox.root.display(),
            sandbox.version,
            archive.display()
        );

        remove_tree(&sandbox.root)?;

        for dir in [
            &sandbox.paths.basedir,
            &sandbox.paths.datadir,
            &sandbox.paths.tmpdir,
        ] {
            create_dir(dir)?;
        }

        let entries = extract_stripped(archive, &sandbox.paths.basedir)?;
        tracing::debug!(
            "Extracted {} entries into {}",
            entries,
            sandbox.paths.basedir.display()
        );

        sandbox.advance(SandboxState::Extracted)?;
        Ok(sandbox)
    }
}

/// Remove a directory tree; a missing tree is fine
fn remove_tree(root: &Path) -> Result<()> {
    match std::fs::remove_dir_all(root) {
        Ok(()) => {
            tracing::debug!("Removed existing tree at {}", root.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SandboxError::io("remove existing sandbox", root, e)),
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(SandboxError::io("create directory", dir, e)),
    }
}
