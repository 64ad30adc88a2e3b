//! modcache - incremental build cache and dependency prebundler
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use modcache::cli::commands::CommandContext;
use modcache::cli::{Cli, Commands};
use modcache::config::{ConfigManager, CONFIG_FILE_NAME};
use modcache::error::{ModcacheError, ModcacheResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ModcacheResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("modcache=warn"),
        1 => EnvFilter::new("modcache=info"),
        _ => EnvFilter::new("modcache=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let cwd = std::env::current_dir().map_err(|e| ModcacheError::io("getting current directory", e))?;

    let config_path = match cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(ModcacheError::ConfigNotFound(path));
            }
            cwd.join(path)
        }
        None => ConfigManager::find_local_config(&cwd).unwrap_or_else(|| cwd.join(CONFIG_FILE_NAME)),
    };
    debug!("Using config: {}", config_path.display());

    let manager = ConfigManager::with_path(config_path);
    let config = manager.load().await?;
    let settings = config.resolve(cli.mode, manager.project_dir())?;
    let ctx = CommandContext {
        manager,
        config,
        settings,
    };

    match cli.command {
        Commands::Hash(args) => modcache::cli::commands::hash(args, &ctx).await,
        Commands::Cache(args) => modcache::cli::commands::cache(args, &ctx).await,
        Commands::Config(args) => modcache::cli::commands::config(args, &ctx).await,
    }
}
