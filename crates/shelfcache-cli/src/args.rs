//! CLI argument definitions using clap derive

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// shelfcache - offline resource cache manager
///
/// Precaches a manifest into a versioned cache generation, evicts old
/// generations on activation, and serves requests cache-first.
#[derive(Parser, Debug)]
#[command(name = "shelfcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SHELFCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Origin that relative resource paths resolve against
    #[arg(long, global = true, env = "SHELFCACHE_ORIGIN")]
    pub origin: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Precache the manifest into the configured generation
    Install,

    /// Make the configured generation current and delete all others
    Activate,

    /// Serve requests through the cache, filling it on a miss
    Fetch(FetchArgs),

    /// List cache generations and their records
    Generations,

    /// Show or initialize configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Resource paths or URLs to request
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Print response bodies to stdout
    #[arg(long)]
    pub body: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,

    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
