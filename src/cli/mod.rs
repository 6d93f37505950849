//! Command-line interface for dbsandbox

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// dbsandbox - disposable database server sandboxes
///
/// Provision a server distribution into an isolated directory tree, start
/// it on its own socket and port, and tear it down when the tests are done.
#[derive(Parser, Debug)]
#[command(name = "dbsandbox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DBSANDBOX_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision, initialize and start a sandbox from a distribution archive
    Create(CreateArgs),

    /// Start an initialized sandbox
    Start(StartArgs),

    /// Stop a sandbox and delete its directory tree
    Destroy(DestroyArgs),

    /// Show a sandbox's layout and state
    Status(StatusArgs),

    /// Print shell exports for talking to a sandbox
    Env(EnvArgs),

    /// Bring up every configured distribution
    Up(UpArgs),

    /// Tear down every configured distribution
    Down(DownArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the create command
#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Server distribution archive (.tar.gz, .tar.xz, .tar.zst, .tar.bz2)
    #[arg(required = true)]
    pub archive: PathBuf,

    /// Sandbox root (default: <sandbox_root>/mysql_<version>)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Port and server-id override (default: version digits, 5.5.10 -> 5510)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Stop after initialization
    #[arg(long)]
    pub no_start: bool,

    /// Output format for the connection parameters
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,

    /// Arguments forwarded to the daemon launcher
    #[arg(last = true)]
    pub launcher_args: Vec<String>,
}

/// Arguments for the start command
#[derive(Parser, Debug)]
pub struct StartArgs {
    /// Sandbox root
    #[arg(required = true)]
    pub root: PathBuf,

    /// Arguments forwarded to the daemon launcher
    #[arg(last = true)]
    pub launcher_args: Vec<String>,
}

/// Arguments for the destroy command
#[derive(Parser, Debug)]
pub struct DestroyArgs {
    /// Sandbox root(s)
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Sandbox root
    #[arg(required = true)]
    pub root: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

/// Arguments for the env command
#[derive(Parser, Debug)]
pub struct EnvArgs {
    /// Sandbox root
    #[arg(required = true)]
    pub root: PathBuf,
}

/// Arguments for the up command
#[derive(Parser, Debug)]
pub struct UpArgs {
    /// Leave sandboxes initialized but stopped
    #[arg(long)]
    pub no_start: bool,
}

/// Arguments for the down command
#[derive(Parser, Debug)]
pub struct DownArgs {
    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Output format for sandbox details
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable pretty output
    Pretty,
    /// JSON output
    Json,
    /// TOML output
    Toml,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Reset configuration to defaults
    Reset,
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Initialize configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
