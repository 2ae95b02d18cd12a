//! tierctl - inspect and maintain a tiercache disk root

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tiercache::TieredCache;
use tracing::debug;

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache root directory
    #[arg(short, long, global = true, default_value = "./cache")]
    root: PathBuf,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disk age limit in seconds (0 disables age expiry)
    #[arg(long, global = true)]
    age_limit: Option<u64>,

    /// Disk size limit in bytes
    #[arg(long, global = true)]
    size_limit: Option<u64>,

    /// Disk record count limit
    #[arg(long, global = true)]
    count_limit: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the payload for a key
    Get {
        key: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Store a file's contents under a key
    Put { key: String, file: PathBuf },
    /// Remove a key
    Rm { key: String },
    /// Remove every record
    Clear,
    /// Show record count, size and limits
    Stat {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List records
    Ls,
    /// Expire old records and enforce limits
    Sweep,
    /// Print the file path for a key
    Path { key: String },
    /// Move a cache directory, merging into an existing destination
    Migrate { from: PathBuf, to: PathBuf },
    /// Print the extended metadata for a key
    ExtGet { key: String },
    /// Attach a file's contents as extended metadata for a key
    ExtSet { key: String, file: PathBuf },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &args.command {
        Command::Migrate { from, to } => commands::migrate(from, to, &mut out)?,
        Command::Get { key, out: dest } => {
            commands::get(&open_cache(&args)?, key, dest.as_deref(), &mut out)?
        }
        Command::Put { key, file } => commands::put(&open_cache(&args)?, key, file, &mut out)?,
        Command::Rm { key } => commands::remove(&open_cache(&args)?, key, &mut out)?,
        Command::Clear => commands::clear(&open_cache(&args)?, &mut out)?,
        Command::Stat { json } => commands::stat(&open_cache(&args)?, *json, &mut out)?,
        Command::Ls => commands::list(&open_cache(&args)?, &mut out)?,
        Command::Sweep => commands::sweep(&open_cache(&args)?, &mut out)?,
        Command::Path { key } => commands::path(&open_cache(&args)?, key, &mut out)?,
        Command::ExtGet { key } => commands::ext_get(&open_cache(&args)?, key, &mut out)?,
        Command::ExtSet { key, file } => {
            commands::ext_set(&open_cache(&args)?, key, file, &mut out)?
        }
    }

    out.flush()?;
    Ok(())
}

fn open_cache(args: &Args) -> Result<TieredCache> {
    let overrides = Overrides {
        age_limit: args.age_limit,
        size_limit: args.size_limit,
        count_limit: args.count_limit,
    };
    let config = config::load(args.config.as_deref(), overrides)?;
    debug!(?config, root = ?args.root, "Opening cache");

    TieredCache::open(&args.root, config)
        .with_context(|| format!("Failed to open cache at {:?}", args.root))
}
