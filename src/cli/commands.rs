//! Command execution handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use serde::Serialize;

use crate::config::Config;
use crate::error::{Result, SandboxError};
use crate::manager::{CreateOptions, SandboxManager};
use crate::models::{ConnectionParams, Sandbox};
use crate::supervisor::pidfile;

/// Execute the create command
pub async fn execute_create(args: &super::CreateArgs, config: Config) -> Result<()> {
    let manager = SandboxManager::new(config);
    let root = match &args.root {
        Some(root) => root.clone(),
        None => manager.default_root(&args.archive, None)?,
    };
    let options = CreateOptions {
        port: args.port,
        no_start: args.no_start,
        launcher_args: args.launcher_args.clone(),
    };

    let archive = args.archive.clone();
    let sandbox = tokio::task::spawn_blocking(move || manager.create(&archive, &root, &options))
        .await
        .map_err(|e| SandboxError::Other(e.to_string()))??;

    print_connection(&sandbox.connection(), &sandbox, args.format)
}

/// Execute the start command
pub async fn execute_start(args: &super::StartArgs, config: Config) -> Result<()> {
    let manager = SandboxManager::new(config);
    let root = args.root.clone();
    let launcher_args = args.launcher_args.clone();

    let params = tokio::task::spawn_blocking(move || manager.start(&root, &launcher_args))
        .await
        .map_err(|e| SandboxError::Other(e.to_string()))??;

    println!("{} {}", style("Running").green().bold(), args.root.display());
    println!("Socket: {}", params.socket.display());
    println!("Port:   {}", params.port);
    Ok(())
}

/// Execute the destroy command
pub async fn execute_destroy(args: &super::DestroyArgs, config: Config) -> Result<()> {
    if !args.yes && !confirm(&format!("Remove {} sandbox(es)?", args.roots.len()))? {
        println!("Aborted");
        return Ok(());
    }

    let manager = SandboxManager::new(config);
    for root in &args.roots {
        manager.destroy(root)?;
        println!("{} {}", style("Removed").red(), root.display());
    }

    Ok(())
}

/// Sandbox details as reported by the status command
#[derive(Debug, Serialize)]
struct StatusReport {
    root: PathBuf,
    version: String,
    state: String,
    port: u16,
    server_id: u32,
    socket: PathBuf,
    pid_file: PathBuf,
    pid: Option<i32>,
    alive: bool,
    archive: PathBuf,
    created_at: String,
}

impl StatusReport {
    fn collect(sandbox: &Sandbox) -> Result<Self> {
        let pid = pidfile::read_pid(&sandbox.paths.pid_file)?;
        Ok(Self {
            root: sandbox.root.clone(),
            version: sandbox.version.to_string(),
            state: sandbox.state.to_string(),
            port: sandbox.port,
            server_id: sandbox.server_id(),
            socket: sandbox.paths.socket.clone(),
            pid_file: sandbox.paths.pid_file.clone(),
            pid: pid.map(|p| p.as_raw()),
            alive: pid.map_or(false, pidfile::is_alive),
            archive: sandbox.archive.clone(),
            created_at: sandbox.created_at.to_rfc3339(),
        })
    }
}

/// Execute the status command
pub async fn execute_status(args: &super::StatusArgs) -> Result<()> {
    let sandbox = Sandbox::open(&args.root)?;
    let report = StatusReport::collect(&sandbox)?;

    match args.format {
        super::OutputFormat::Pretty => {
            println!("{}", style("Sandbox Status").bold().underlined());
            println!("Root:       {}", report.root.display());
            println!("Version:    {}", report.version);
            println!("State:      {}", report.state);
            println!("Port:       {}", report.port);
            println!("Server ID:  {}", report.server_id);
            println!("Socket:     {}", report.socket.display());
            match report.pid {
                Some(pid) if report.alive => println!("Process:    {} ({})", pid, style("alive").green()),
                Some(pid) => println!("Process:    {} ({})", pid, style("gone").yellow()),
                None => println!("Process:    {}", style("none").dim()),
            }
            println!("Archive:    {}", report.archive.display());
            println!("Created:    {}", report.created_at);
        }
        super::OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        super::OutputFormat::Toml => {
            println!("{}", toml::to_string_pretty(&report).map_err(|e| SandboxError::Other(e.to_string()))?);
        }
    }

    Ok(())
}

/// Execute the env command
pub async fn execute_env(args: &super::EnvArgs, config: Config) -> Result<()> {
    let manager = SandboxManager::new(config);
    let sandbox = manager.open(&args.root)?;

    for (key, value) in manager.environment(&sandbox) {
        println!("export {}='{}'", key, value.replace('\'', r"'\''"));
    }

    Ok(())
}

/// Execute the up command
pub async fn execute_up(args: &super::UpArgs, config: Config) -> Result<()> {
    use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

    if config.distributions.is_empty() {
        println!("No distributions configured");
        return Ok(());
    }

    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template("{prefix:.bold.dim} {spinner} {wide_msg}")
        .map_err(|e| SandboxError::Other(e.to_string()))?;

    let distributions = config.distributions.clone();
    let manager = Arc::new(SandboxManager::new(config));
    let mut handles = Vec::new();

    for dist in distributions {
        let manager = Arc::clone(&manager);
        let root = manager.default_root(&dist.archive, dist.name.as_deref())?;
        let options = CreateOptions {
            port: dist.port,
            no_start: args.no_start,
            launcher_args: Vec::new(),
        };

        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(style.clone());
        pb.set_prefix(root.file_name().unwrap_or_default().to_string_lossy().to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb.set_message(format!("provisioning {}", dist.archive.display()));

        handles.push(tokio::task::spawn_blocking(move || {
            let result = manager.create(&dist.archive, &root, &options);
            match &result {
                Ok(sandbox) => pb.finish_with_message(format!(
                    "{} port {} ({})",
                    sandbox.state,
                    sandbox.port,
                    sandbox.paths.socket.display()
                )),
                Err(e) => pb.abandon_with_message(format!("failed: {}", e)),
            }
            result
        }));
    }

    let mut failures = 0;
    for handle in handles {
        if let Err(e) = handle.await.map_err(|e| SandboxError::Other(e.to_string()))? {
            tracing::error!("{}", e);
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(SandboxError::Other(format!("{} sandbox(es) failed to come up", failures)));
    }
    Ok(())
}

/// Execute the down command
pub async fn execute_down(args: &super::DownArgs, config: Config) -> Result<()> {
    if config.distributions.is_empty() {
        println!("No distributions configured");
        return Ok(());
    }

    if !args.yes && !confirm(&format!("Remove {} configured sandbox(es)?", config.distributions.len()))? {
        println!("Aborted");
        return Ok(());
    }

    let manager = SandboxManager::new(config);
    for dist in &manager.config().distributions {
        let root = manager.default_root(&dist.archive, dist.name.as_deref())?;
        manager.destroy(&root)?;
        println!("{} {}", style("Removed").red(), root.display());
    }

    Ok(())
}

/// Execute the config command
pub async fn execute_config(args: &super::ConfigArgs, path: &Path) -> Result<()> {
    match &args.command {
        super::ConfigCommands::Show => {
            let config = Config::load_from(path)?;
            println!("{}", toml::to_string_pretty(&config).map_err(|e| SandboxError::Other(e.to_string()))?);
        }
        super::ConfigCommands::Reset => {
            Config::reset(path)?;
            println!("Configuration reset to defaults");
        }
        super::ConfigCommands::Set { key, value } => {
            let mut config = Config::load_from(path)?;
            config.set(key, value)?;
            config.save_to(path)?;
            println!("Set {} = {}", key, value);
        }
        super::ConfigCommands::Get { key } => {
            let config = Config::load_from(path)?;
            if let Some(value) = config.get(key) {
                println!("{}", value);
            } else {
                println!("Key '{}' not found", key);
            }
        }
        super::ConfigCommands::Init { force } => {
            Config::init(path, *force)?;
            println!("Configuration initialized at {}", path.display());
        }
    }

    Ok(())
}

fn print_connection(params: &ConnectionParams, sandbox: &Sandbox, format: super::OutputFormat) -> Result<()> {
    match format {
        super::OutputFormat::Pretty => {
            println!("{} {}", style(sandbox.state.to_string()).green().bold(), sandbox.root.display());
            println!("Socket: {}", params.socket.display());
            println!("Port:   {}", params.port);
        }
        super::OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(params)?);
        }
        super::OutputFormat::Toml => {
            println!("{}", toml::to_string_pretty(params).map_err(|e| SandboxError::Other(e.to_string()))?);
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| SandboxError::Other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerVersion;
    use tempfile::TempDir;

    #[test]
    fn test_status_report_without_process() {
        let temp_dir = TempDir::new().unwrap();
        let version: ServerVersion = "5.5.10".parse().unwrap();
        let sandbox = Sandbox::new(
            temp_dir.path().join("sb1"),
            "server-5.5.10-linux-x86_64.tar.gz",
            version,
            5510,
            &Config::default().server,
        )
        .unwrap();

        let report = StatusReport::collect(&sandbox).unwrap();
        assert_eq!(report.pid, None);
        assert!(!report.alive);
        assert_eq!(report.server_id, 5510);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["version"], "5.5.10");
        assert!(toml::to_string_pretty(&report).unwrap().contains("port = 5510"));
    }

    #[tokio::test]
    async fn test_config_roundtrip_through_commands() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let init = super::super::ConfigArgs {
            command: super::super::ConfigCommands::Init { force: false },
        };
        execute_config(&init, &path).await.unwrap();
        assert!(path.exists());

        let set = super::super::ConfigArgs {
            command: super::super::ConfigCommands::Set {
                key: "timing.ready_attempts".into(),
                value: "5".into(),
            },
        };
        execute_config(&set, &path).await.unwrap();
        assert_eq!(Config::load_from(&path).unwrap().timing.ready_attempts, 5);

        assert!(execute_config(&init, &path).await.is_err());
    }
}
