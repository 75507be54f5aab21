//! alfsync CLI
//!
//! Command-line driver for mirroring an Alfresco repository's changes feed.
//!
//! # Commands
//!
//! - `sync` - Run one incremental synchronization and print dispatched documents
//! - `reindex` - Dispatch one range of a path's subtree
//! - `authorities` - Resolve the authorities of one or all users
//!
//! Dispatched documents and query results go to stdout as JSON; logs go to
//! stderr.

mod commands;

use alfsync_engine::{BlockingHttpClient, HttpChangeFeed, SyncConfig};
use alfsync_protocol::PageLimits;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Incremental sync for an Alfresco changes feed.
#[derive(Parser)]
#[command(name = "alfsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    repository: RepositoryArgs,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Repository connection flags, applied over `--params` when both are given.
#[derive(Args)]
struct RepositoryArgs {
    /// JSON file of connector parameters (`hostname`, `storeid`, ...)
    #[arg(global = true, long)]
    params: Option<PathBuf>,

    /// URL scheme
    #[arg(global = true, long)]
    protocol: Option<String>,

    /// Repository host, optionally with a port
    #[arg(global = true, long)]
    hostname: Option<String>,

    /// Web script path prefix
    #[arg(global = true, long)]
    endpoint: Option<String>,

    /// Store protocol
    #[arg(global = true, long)]
    store_protocol: Option<String>,

    /// Store id
    #[arg(global = true, long)]
    store_id: Option<String>,

    /// User name for Basic authentication
    #[arg(global = true, short, long)]
    username: Option<String>,

    /// Password for Basic authentication
    #[arg(global = true, short, long)]
    password: Option<String>,

    /// Merge node metadata into every upserted document
    #[arg(global = true, long)]
    enrich: bool,
}

impl RepositoryArgs {
    fn into_config(self) -> Result<SyncConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.params {
            Some(path) => commands::load_params(path)?,
            None => SyncConfig::default(),
        };

        let repository = &mut config.repository;
        if let Some(protocol) = self.protocol {
            repository.protocol = protocol;
        }
        if let Some(hostname) = self.hostname {
            repository.hostname = hostname;
        }
        if let Some(endpoint) = self.endpoint {
            repository.endpoint = endpoint;
        }
        if let Some(store_protocol) = self.store_protocol {
            repository.store_protocol = store_protocol;
        }
        if let Some(store_id) = self.store_id {
            repository.store_id = store_id;
        }
        if self.username.is_some() {
            repository.username = self.username;
        }
        if self.password.is_some() {
            repository.password = self.password;
        }
        if self.enrich {
            config.enrich_metadata = true;
        }

        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one incremental synchronization
    Sync {
        /// File holding the checkpoint token between runs
        #[arg(short, long, default_value = commands::DEFAULT_CHECKPOINT)]
        checkpoint: PathBuf,

        /// Maximum transactions per page
        #[arg(long)]
        max_txns: Option<u64>,

        /// Maximum ACL changesets per page
        #[arg(long)]
        max_acl_changesets: Option<u64>,
    },

    /// Dispatch one range of documents under a repository path
    Reindex {
        /// Repository path to reindex from
        #[arg(long)]
        path: String,

        /// First index of the range
        #[arg(long, default_value = "0")]
        start: u64,

        /// End index of the range
        #[arg(long)]
        end: u64,
    },

    /// Resolve user authorities
    Authorities {
        /// User to resolve; all users when omitted
        username: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("alfsync CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = cli.repository.into_config()?;
    let feed = HttpChangeFeed::new(&config.repository, BlockingHttpClient);
    let stdout = std::io::stdout();

    match cli.command {
        Commands::Sync {
            checkpoint,
            max_txns,
            max_acl_changesets,
        } => {
            let mut limits = PageLimits::unset();
            if let Some(max) = max_txns {
                limits = limits.with_max_transactions(max);
            }
            if let Some(max) = max_acl_changesets {
                limits = limits.with_max_acl_changesets(max);
            }
            let config = config.with_page_limits(limits);
            commands::sync::run(config, feed, &checkpoint, stdout)?;
        }
        Commands::Reindex { path, start, end } => {
            commands::reindex::run(config, feed, &path, start, end, stdout)?;
        }
        Commands::Authorities { username } => {
            commands::authorities::run(&feed, username.as_deref(), stdout)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
