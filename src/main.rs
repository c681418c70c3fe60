use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use lookout::LookoutError;
use lookout::commands::{
    SidebarOptions, cmd_cache_clear, cmd_cache_path, cmd_config_show, cmd_sidebar,
};
use lookout::config::{ENV_SENTRY_AUTH_TOKEN, ENV_SENTRY_PROJECTS, ENV_SENTRY_URL};
use lookout::mcp::{cmd_mcp, cmd_mcp_version};
use tracing_subscriber::EnvFilter;

const ENV_LOG: &str = "LOOKOUT_LOG";

#[derive(Parser)]
#[command(name = "lookout")]
#[command(about = "Sentry issues and ClickUp tasks for your editor and your agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server over stdio (configured from the environment)
    Mcp {
        /// Print the MCP protocol version and exit
        #[arg(long)]
        version: bool,
    },

    /// Run the sidebar host: JSON intents on stdin, state updates on stdout
    Sidebar {
        /// Config file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Workspace directory the issue cache belongs to (default: cwd)
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Seconds between background refreshes (minimum 10)
        #[arg(long)]
        interval: Option<u64>,

        /// Serve MCP on this unix socket, sharing the sidebar's state
        #[arg(long)]
        mcp_socket: Option<PathBuf>,
    },

    /// Manage the cached issue snapshot
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cache file path for a workspace
    Path {
        /// Workspace directory (default: cwd)
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete the cache file for a workspace
    Clear {
        /// Workspace directory (default: cwd)
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration (tokens masked)
    Show {
        /// Config file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Logs always go to stderr: stdout carries the MCP and sidebar protocols.
fn init_logging() {
    let filter = EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Mcp { version } => {
            if version {
                cmd_mcp_version()
            } else {
                cmd_mcp().await
            }
        }
        Commands::Sidebar {
            config,
            workspace,
            interval,
            mcp_socket,
        } => {
            cmd_sidebar(SidebarOptions {
                config,
                workspace,
                interval,
                mcp_socket,
            })
            .await
        }
        Commands::Cache { action } => match action {
            CacheAction::Path { workspace, json } => cmd_cache_path(workspace.as_deref(), json),
            CacheAction::Clear { workspace, json } => cmd_cache_clear(workspace.as_deref(), json),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { config, json } => cmd_config_show(config.as_deref(), json),
        },
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            if matches!(e, LookoutError::Config(ref msg) if msg.contains("environment variable"))
            {
                eprintln!(
                    "\nThe MCP server needs {ENV_SENTRY_URL}, {ENV_SENTRY_AUTH_TOKEN} and \
                     {ENV_SENTRY_PROJECTS} (comma-separated org/project list)."
                );
            }
            ExitCode::FAILURE
        }
    }
}
