//! Configuration management for dbsandbox

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Server layout and template parameters
    #[serde(default)]
    pub server: ServerConfig,

    /// Readiness polling and teardown timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Distributions brought up by `dbsandbox up`
    #[serde(default)]
    pub distributions: Vec<DistributionConfig>,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory that holds sandboxes created without an explicit root
    pub sandbox_root: Option<PathBuf>,
}

/// Server layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name of the generated server configuration file
    pub config_filename: String,
    /// Name of the pid file inside the data directory
    pub pid_filename: String,
    /// Name of the listen socket inside the data directory
    pub socket_filename: String,
    /// Value for innodb-buffer-pool-size
    pub innodb_buffer_pool_size: String,
    /// Daemon launcher under `<basedir>/bin`
    pub launcher: String,
    /// Bootstrap utility under `<basedir>/scripts` or `<basedir>/bin`
    pub install_utility: String,
    /// How long the generated start script waits for the pid file, in seconds
    pub start_timeout_secs: u32,
    /// Have the start script log launcher output to `start.log`
    pub debug: bool,
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between readiness checks, in milliseconds
    pub poll_interval_ms: u64,
    /// Number of readiness checks before giving up
    pub ready_attempts: u32,
    /// Wait after signaling the server before removing its tree, in milliseconds
    pub grace_period_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

/// A distribution archive to provision with `dbsandbox up`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Path to the distribution archive
    pub archive: PathBuf,
    /// Sandbox directory name under the sandbox root
    pub name: Option<String>,
    /// Port override
    pub port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_filename: "my.sandbox.cnf".to_string(),
            pid_filename: "sandbox.pid".to_string(),
            socket_filename: "sandbox.sock".to_string(),
            innodb_buffer_pool_size: "128M".to_string(),
            launcher: "mysqld_safe".to_string(),
            install_utility: "mysql_install_db".to_string(),
            start_timeout_secs: 60,
            debug: false,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            ready_attempts: 60,
            grace_period_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TimingConfig {
    /// Delay between readiness checks
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Wait between signaling and removal
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Config {
    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SandboxError::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("dbsandbox").join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, falling back to defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SandboxError::Config(e.to_string()))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Reset configuration at `path` to defaults
    pub fn reset(path: &Path) -> Result<()> {
        Self::default().save_to(path)
    }

    /// Initialize a configuration file at `path`
    pub fn init(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(SandboxError::Config(
                "Configuration file already exists. Use --force to overwrite.".into()
            ));
        }

        Self::default().save_to(path)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "general.sandbox_root" => self.general.sandbox_root.as_ref().map(|p| p.display().to_string()),

            "server.config_filename" => Some(self.server.config_filename.clone()),
            "server.pid_filename" => Some(self.server.pid_filename.clone()),
            "server.socket_filename" => Some(self.server.socket_filename.clone()),
            "server.innodb_buffer_pool_size" => Some(self.server.innodb_buffer_pool_size.clone()),
            "server.launcher" => Some(self.server.launcher.clone()),
            "server.install_utility" => Some(self.server.install_utility.clone()),
            "server.start_timeout_secs" => Some(self.server.start_timeout_secs.to_string()),
            "server.debug" => Some(self.server.debug.to_string()),

            "timing.poll_interval_ms" => Some(self.timing.poll_interval_ms.to_string()),
            "timing.ready_attempts" => Some(self.timing.ready_attempts.to_string()),
            "timing.grace_period_ms" => Some(self.timing.grace_period_ms.to_string()),

            "logging.level" => Some(self.logging.level.clone()),

            _ => None,
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "general.sandbox_root" => {
                self.general.sandbox_root = if value.is_empty() { None } else { Some(PathBuf::from(value)) };
            }

            "server.config_filename" => {
                self.server.config_filename = non_empty(key, value)?;
            }
            "server.pid_filename" => {
                self.server.pid_filename = non_empty(key, value)?;
            }
            "server.socket_filename" => {
                self.server.socket_filename = non_empty(key, value)?;
            }
            "server.innodb_buffer_pool_size" => {
                self.server.innodb_buffer_pool_size = non_empty(key, value)?;
            }
            "server.launcher" => {
                self.server.launcher = non_empty(key, value)?;
            }
            "server.install_utility" => {
                self.server.install_utility = non_empty(key, value)?;
            }
            "server.start_timeout_secs" => {
                self.server.start_timeout_secs = value.parse().map_err(|_| {
                    SandboxError::Config("Invalid number for start_timeout_secs".into())
                })?;
            }
            "server.debug" => {
                self.server.debug = value.parse().map_err(|_| {
                    SandboxError::Config("Invalid boolean for debug".into())
                })?;
            }

            "timing.poll_interval_ms" => {
                self.timing.poll_interval_ms = value.parse().map_err(|_| {
                    SandboxError::Config("Invalid number for poll_interval_ms".into())
                })?;
            }
            "timing.ready_attempts" => {
                self.timing.ready_attempts = value.parse().map_err(|_| {
                    SandboxError::Config("Invalid number for ready_attempts".into())
                })?;
            }
            "timing.grace_period_ms" => {
                self.timing.grace_period_ms = value.parse().map_err(|_| {
                    SandboxError::Config("Invalid number for grace_period_ms".into())
                })?;
            }

            "logging.level" => {
                self.logging.level = value.to_string();
            }

            _ => {
                return Err(SandboxError::Config(format!("Unknown configuration key: {}", key)));
            }
        }

        Ok(())
    }

    /// Get the sandbox root directory
    pub fn sandbox_root(&self) -> PathBuf {
        self.general.sandbox_root.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("dbsandbox")
        })
    }
}

fn non_empty(key: &str, value: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(SandboxError::Config(format!("{} cannot be empty", key)));
    }
    Ok(value.to_string())
}
