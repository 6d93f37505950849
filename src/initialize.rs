//! System table bootstrap

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::ServerConfig;
use crate::error::{Result, SandboxError};
use crate::models::{Sandbox, SandboxState};

/// Runs the distribution's install utility against a sandbox's data directory
pub struct Initializer<'a> {
    server: &'a ServerConfig,
}

impl<'a> Initializer<'a> {
    /// Create an initializer using the given server parameters
    pub fn new(server: &'a ServerConfig) -> Self {
        Self { server }
    }

    /// Locate the install utility inside the distribution.
    ///
    /// Older distributions ship it under `scripts/`, newer ones under `bin/`.
    pub fn find_install_utility(&self, basedir: &Path) -> Result<PathBuf> {
        let name = self.server.install_utility.as_str();

        for dir in ["scripts", "bin"] {
            let candidate = basedir.join(dir).join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        for entry in walkdir::WalkDir::new(basedir).max_depth(2) {
            let entry = entry?;
            if entry.file_type().is_file() && entry.file_name() == name {
                return Ok(entry.into_path());
            }
        }

        Err(SandboxError::ToolNotFound {
            tool: basedir.join("scripts").join(name),
            args: Vec::new(),
        })
    }

    /// Arguments passed to the install utility
    pub fn arguments(&self, sandbox: &Sandbox, user: &str) -> Vec<String> {
        vec![
            "--no-defaults".to_string(),
            format!("--user={}", user),
            format!("--basedir={}", sandbox.paths.basedir.display()),
            format!("--datadir={}", sandbox.paths.datadir.display()),
            "--skip-name-resolve".to_string(),
        ]
    }

    /// Bootstrap the data directory. Runs once and blocks until the utility
    /// exits; stdout is discarded and stderr passes through.
    pub fn initialize(&self, sandbox: &mut Sandbox) -> Result<()> {
        sandbox.expect_state(SandboxState::Configured, SandboxState::Initialized)?;

        let tool = self.find_install_utility(&sandbox.paths.basedir)?;
        let args = self.arguments(sandbox, &current_user()?);
        tracing::info!("Initializing {}", sandbox.paths.datadir.display());
        tracing::debug!("{} {}", tool.display(), args.join(" "));

        run_tool(&tool, &args, &sandbox.paths.basedir)?;

        sandbox.advance(SandboxState::Initialized)?;
        sandbox.save_manifest()?;
        Ok(())
    }
}

/// Run an external tool to completion, mapping spawn and exit failures
pub(crate) fn run_tool(tool: &Path, args: &[String], cwd: &Path) -> Result<()> {
    let status = Command::new(tool)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| spawn_error(tool, args, e))?;

    if !status.success() {
        return Err(SandboxError::ToolFailed {
            tool: tool.to_path_buf(),
            args: args.to_vec(),
            status,
        });
    }

    Ok(())
}

/// Map a spawn failure to "tool not found" when the binary is missing
pub(crate) fn spawn_error(tool: &Path, args: &[String], err: std::io::Error) -> SandboxError {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => SandboxError::ToolNotFound {
            tool: tool.to_path_buf(),
            args: args.to_vec(),
        },
        _ => SandboxError::io("spawn", tool, err),
    }
}

/// Name of the user running this process
pub fn current_user() -> Result<String> {
    let uid = nix::unistd::getuid();
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        _ => std::env::var("USER").map_err(|_| {
            SandboxError::Other(format!("Cannot resolve a user name for uid {}", uid))
        }),
    }
}
