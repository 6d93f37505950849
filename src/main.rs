//! dbsandbox - disposable database server sandboxes
//!
//! Main entry point for the dbsandbox CLI application.

use std::path::PathBuf;
use std::process::ExitCode;

use console::style;
use tracing_subscriber::EnvFilter;

use dbsandbox::cli::{self, Cli, Commands};
use dbsandbox::config::Config;
use dbsandbox::error::Result;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    let config = config_path(&cli).and_then(|path| Ok((Config::load_from(&path)?, path)));

    // Set up logging
    let configured_level = config.as_ref().ok().map(|(c, _)| c.logging.level.as_str());
    setup_logging(&cli, configured_level);

    let result = match config {
        Ok((config, path)) => run(cli, config, path).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => Config::config_path(),
    }
}

/// Set up logging based on CLI arguments and the configured level
fn setup_logging(cli: &Cli, configured: Option<&str>) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        configured.unwrap_or("info")
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Main application logic
async fn run(cli: Cli, config: Config, config_path: PathBuf) -> Result<()> {
    match cli.command {
        Commands::Create(args) => {
            cli::execute_create(&args, config).await
        }
        Commands::Start(args) => {
            cli::execute_start(&args, config).await
        }
        Commands::Destroy(args) => {
            cli::execute_destroy(&args, config).await
        }
        Commands::Status(args) => {
            cli::execute_status(&args).await
        }
        Commands::Env(args) => {
            cli::execute_env(&args, config).await
        }
        Commands::Up(args) => {
            cli::execute_up(&args, config).await
        }
        Commands::Down(args) => {
            cli::execute_down(&args, config).await
        }
        Commands::Config(args) => {
            cli::execute_config(&args, &config_path).await
        }
    }
}
