//! CLI argument definitions using clap derive

use crate::config::BuildMode;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// modcache - incremental build cache and dependency prebundler
///
/// Inspects and maintains the hook caches and version hashes used by
/// cached module builds.
#[derive(Parser, Debug)]
#[command(name = "modcache")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MODCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Build mode (anything but "production" means development)
    #[arg(long, global = true, env = "NODE_ENV", default_value = "development")]
    pub mode: BuildMode,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the build-wide version hash
    Hash(HashArgs),

    /// Inspect or clear hook caches
    Cache(CacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the hash command
#[derive(Parser, Debug)]
pub struct HashArgs {
    /// Extra dependency file to include (repeatable)
    #[arg(short, long = "dep")]
    pub deps: Vec<PathBuf>,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache location and entry counts
    Info,

    /// Remove every cache namespace of this build
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show effective configuration
    Show,

    /// Show configuration file path
    Path,
}
