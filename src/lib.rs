//! dbsandbox - disposable database server sandboxes
//!
//! dbsandbox provisions a server distribution archive into an isolated
//! directory tree, renders its configuration and start script, bootstraps
//! the system tables and starts the daemon on its own socket and port. When
//! the test run is over the sandbox is killed and its tree deleted.
//!
//! Unix only: the supervisor relies on sessions, signals and pid files.
//!
//! # Quick Start
//!
//! ```bash
//! # Provision and start a sandbox (port 5510 for version 5.5.10)
//! dbsandbox create mysql-5.5.10-linux2.6-x86_64.tar.gz
//!
//! # Export its socket and port for a test harness
//! eval "$(dbsandbox env ~/.cache/dbsandbox/mysql_5.5.10)"
//!
//! # Tear it down
//! dbsandbox destroy -y ~/.cache/dbsandbox/mysql_5.5.10
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod configure;
pub mod error;
pub mod initialize;
pub mod manager;
pub mod models;
pub mod provision;
pub mod supervisor;
pub mod template;

// Re-export commonly used types
pub use error::{Result, SandboxError};
pub use manager::{CreateOptions, SandboxManager};
pub use models::{ConnectionParams, Sandbox, SandboxState, ServerVersion};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Create and start a sandbox with the default configuration
///
/// # Arguments
///
/// * `archive` - Path to the server distribution archive
/// * `root` - Directory the sandbox is built in; replaced if it exists
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let sandbox = dbsandbox::create(
///         Path::new("mysql-5.5.10-linux2.6-x86_64.tar.gz"),
///         Path::new("/tmp/mysql_5.5.10"),
///     )?;
///
///     let params = sandbox.connection();
///     println!("{} {}", params.socket.display(), params.port);
///
///     dbsandbox::destroy(&sandbox.root)?;
///     Ok(())
/// }
/// ```
pub fn create(archive: &std::path::Path, root: &std::path::Path) -> Result<Sandbox> {
    SandboxManager::new(config::Config::default()).create(archive, root, &CreateOptions::default())
}

/// Stop the sandbox at `root` and delete its tree
pub fn destroy(root: &std::path::Path) -> Result<()> {
    SandboxManager::new(config::Config::default()).destroy(root)
}
