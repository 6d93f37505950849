//! Instance configuration file and start script generation

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::ServerConfig;
use crate::error::{Result, SandboxError};
use crate::models::{Sandbox, SandboxState};
use crate::template::{self, names};

/// Mode of the generated start script: rwx for the owner, r-x for the group
pub const START_SCRIPT_MODE: u32 = 0o750;

/// Renders and writes the per-instance artifacts of a sandbox
pub struct Configurator<'a> {
    server: &'a ServerConfig,
}

impl<'a> Configurator<'a> {
    /// Create a configurator using the given server parameters
    pub fn new(server: &'a ServerConfig) -> Self {
        Self { server }
    }

    /// Substitution values shared by both templates
    pub fn values(&self, sandbox: &Sandbox) -> HashMap<String, String> {
        let paths = &sandbox.paths;
        let mut values = HashMap::new();

        let mut put = |key: &str, value: String| {
            values.insert(key.to_string(), value);
        };
        put("sandboxdir", sandbox.root.display().to_string());
        put("basedir", paths.basedir.display().to_string());
        put("datadir", paths.datadir.display().to_string());
        put("tmpdir", paths.tmpdir.display().to_string());
        put("pid_file", paths.pid_file.display().to_string());
        put("socket", paths.socket.display().to_string());
        put("config_file", paths.config_file.display().to_string());
        put("mysql_port", sandbox.port.to_string());
        put("server_id", sandbox.server_id().to_string());
        put("innodb_buffer_pool_size", self.server.innodb_buffer_pool_size.clone());
        put("mysqld_safe", self.server.launcher.clone());
        put("start_timeout", self.server.start_timeout_secs.to_string());

        values
    }

    /// Render the server configuration file text
    pub fn render_config(&self, sandbox: &Sandbox) -> Result<String> {
        Ok(template::render(builtin(names::SERVER_CONFIG)?, &self.values(sandbox)))
    }

    /// Render the start script text
    pub fn render_start_script(&self, sandbox: &Sandbox) -> Result<String> {
        Ok(template::render(builtin(names::START_SCRIPT)?, &self.values(sandbox)))
    }

    /// Write the configuration file and start script, then mark the script
    /// executable. The sandbox only becomes `Configured` if every write
    /// succeeded.
    pub fn configure(&self, sandbox: &mut Sandbox) -> Result<()> {
        sandbox.expect_state(SandboxState::Extracted, SandboxState::Configured)?;

        let config = self.render_config(sandbox)?;
        write_file(&sandbox.paths.config_file, &config)?;

        let script = self.render_start_script(sandbox)?;
        write_file(&sandbox.paths.start_script, &script)?;
        make_executable(&sandbox.paths.start_script)?;

        sandbox.advance(SandboxState::Configured)?;
        sandbox.save_manifest()?;

        tracing::info!(
            "Wrote {} and {}",
            sandbox.paths.config_file.display(),
            sandbox.paths.start_script.display()
        );
        Ok(())
    }
}

fn builtin(name: &str) -> Result<&'static str> {
    template::get(name).ok_or_else(|| SandboxError::Other(format!("Unknown template: {}", name)))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| SandboxError::io("write", path, e))
}

fn make_executable(path: &Path) -> Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(START_SCRIPT_MODE))
        .map_err(|e| SandboxError::io("chmod", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerVersion;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn extracted_sandbox(root: &Path, server: &ServerConfig) -> Sandbox {
        let version: ServerVersion = "5.5.10".parse().unwrap();
        let mut sandbox = Sandbox::new(
            root,
            "server-5.5.10-linux-x86_64.tar.gz",
            version,
            5510,
            server,
        )
        .unwrap();
        sandbox.advance(SandboxState::Extracted).unwrap();
        sandbox
    }

    /// First `key = value` setting with this key
    fn setting<'c>(config: &'c str, key: &str) -> Option<&'c str> {
        config.lines().find_map(|line| {
            let (k, v) = line.split_once('=')?;
            (k.trim() == key).then(|| v.trim())
        })
    }

    #[test]
    fn test_rendered_config() {
        let server = ServerConfig::default();
        let sandbox = extracted_sandbox(Path::new("/tmp/sb1"), &server);
        let config = Configurator::new(&server).render_config(&sandbox).unwrap();

        assert!(config.starts_with("[mysqld]"));
        assert_eq!(setting(&config, "port"), Some("5510"));
        assert_eq!(setting(&config, "server-id"), Some("5510"));
        assert_eq!(setting(&config, "socket"), Some("/tmp/sb1/data/sandbox.sock"));
        assert_eq!(setting(&config, "pid-file"), Some("/tmp/sb1/data/sandbox.pid"));
        assert_eq!(setting(&config, "innodb-buffer-pool-size"), Some("128M"));
        assert!(!config.contains("${"));
    }

    #[test]
    fn test_rendered_start_script() {
        let server = ServerConfig::default();
        let sandbox = extracted_sandbox(Path::new("/tmp/sb1"), &server);
        let script = Configurator::new(&server).render_start_script(&sandbox).unwrap();

        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("BASEDIR='/tmp/sb1/5.5.10'"));
        assert!(script.contains("MYSQLD_SAFE=\"$BASEDIR/bin/mysqld_safe\""));
        assert!(script.contains("DEFAULTS_FILE='/tmp/sb1/my.sandbox.cnf'"));
        assert!(script.contains("PIDFILE='/tmp/sb1/data/sandbox.pid'"));
        assert!(script.contains("$LD_LIBRARY_PATH"));
        assert!(script.contains("TIMEOUT=60\n"));
        assert!(script.trim_end().ends_with("exit 0"));
    }

    #[test]
    fn test_configure_writes_files() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig::default();
        let mut sandbox = extracted_sandbox(temp_dir.path(), &server);

        Configurator::new(&server).configure(&mut sandbox).unwrap();
        assert_eq!(sandbox.state, SandboxState::Configured);

        let config = std::fs::read_to_string(temp_dir.path().join("my.sandbox.cnf")).unwrap();
        assert_eq!(setting(&config, "port"), Some("5510"));
        assert!(sandbox.manifest_path().is_file());

        let mode = std::fs::metadata(temp_dir.path().join("start.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_configure_write_failure_keeps_state() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig::default();
        let mut sandbox = extracted_sandbox(temp_dir.path(), &server);
        sandbox.paths.start_script = PathBuf::from("/nonexistent/dir/start.sh");

        let err = Configurator::new(&server).configure(&mut sandbox).unwrap_err();
        assert!(matches!(err, SandboxError::IoAt { .. }));
        assert_eq!(sandbox.state, SandboxState::Extracted);
    }

    #[test]
    fn test_configure_requires_extracted() {
        let server = ServerConfig::default();
        let version: ServerVersion = "5.5.10".parse().unwrap();
        let mut sandbox = Sandbox::new("/tmp/sb1", "a-5.5.10.tar.gz", version, 5510, &server).unwrap();

        assert!(matches!(
            Configurator::new(&server).configure(&mut sandbox),
            Err(SandboxError::InvalidTransition { .. })
        ));
    }
}
