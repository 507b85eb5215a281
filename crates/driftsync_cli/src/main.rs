//! driftsync CLI
//!
//! Command-line client for an offline-first driftsync data directory.
//!
//! # Commands
//!
//! - `enqueue` - Record a local change and queue it for sync
//! - `queue` - List queued mutations
//! - `status` - Show queue, dead-letter and entity status
//! - `dead-letters` - List mutations that exhausted their retries
//! - `replay` - Move a dead-letter entry back into the queue
//! - `purge` - Delete dead-letter entries
//! - `probe` - Check whether the remote authority is reachable
//! - `sync` - Run one sync pass
//! - `watch` - Run sync passes on an interval

mod client;
mod commands;
mod data;

use clap::{Parser, Subcommand};
use commands::RemoteOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offline-first sync client.
#[derive(Parser)]
#[command(name = "driftsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long, default_value = "./driftsync-data")]
    data: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that contact the remote authority.
#[derive(clap::Args)]
struct RemoteArgs {
    /// Base URL of the remote authority
    #[arg(short, long)]
    server: String,

    /// Maximum mutations per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Failed attempts before a mutation is dead-lettered
    #[arg(long)]
    max_retries: Option<u32>,

    /// Batch submission timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl From<RemoteArgs> for RemoteOptions {
    fn from(args: RemoteArgs) -> Self {
        Self {
            server: args.server,
            batch_size: args.batch_size,
            max_retries: args.max_retries,
            timeout_secs: args.timeout,
            interval_secs: None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record a local change and queue it for sync
    Enqueue {
        /// Entity identifier
        entity_id: String,

        /// Operation (create, update, delete)
        operation: String,

        /// Field values as a JSON object
        #[arg(short, long)]
        json: Option<String>,
    },

    /// List queued mutations
    Queue {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show queue, dead-letter and entity status
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List mutations that exhausted their retries
    DeadLetters {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Move a dead-letter entry back into the queue
    Replay {
        /// Dead-letter entry id
        id: u64,
    },

    /// Delete dead-letter entries
    Purge {
        /// Entry to delete
        #[arg(required_unless_present = "all")]
        id: Option<u64>,

        /// Delete every entry
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Check whether the remote authority is reachable
    Probe {
        /// Base URL of the remote authority
        #[arg(short, long)]
        server: String,

        /// Probe timeout in seconds
        #[arg(short, long, default_value = "5")]
        timeout: u64,
    },

    /// Run one sync pass
    Sync {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run sync passes on an interval
    Watch {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Seconds between passes
        #[arg(short, long, default_value = "30")]
        interval: u64,

        /// Stop after this many passes
        #[arg(long)]
        passes: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let data = cli.data.as_path();
    match cli.command {
        Commands::Enqueue {
            entity_id,
            operation,
            json,
        } => commands::enqueue::run(data, &entity_id, &operation, json.as_deref())?,
        Commands::Queue { format } => commands::queue::run(data, &format)?,
        Commands::Status { format } => commands::status::run(data, &format)?,
        Commands::DeadLetters { format } => commands::dead_letters::list(data, &format)?,
        Commands::Replay { id } => commands::dead_letters::replay(data, id)?,
        Commands::Purge { id, all } => {
            let target = if all { None } else { id };
            commands::dead_letters::purge(data, target)?;
        }
        Commands::Probe { server, timeout } => commands::probe::run(&server, timeout)?,
        Commands::Sync { remote, format } => {
            commands::sync::run(data, &remote.into(), &format)?;
        }
        Commands::Watch {
            remote,
            interval,
            passes,
            format,
        } => {
            let mut remote: RemoteOptions = remote.into();
            remote.interval_secs = Some(interval);
            commands::watch::run(data, &remote, passes, &format)?;
        }
        Commands::Version => {
            println!("driftsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
