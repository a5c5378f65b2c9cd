//! Stockroom CLI
//!
//! Command-line interface for Stockroom - offline-first businesses and
//! articles, replicated to a remote document service.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stockroom_core::{ArticlePatch, Config, PassOutcome, Store, StoreError};

mod commands;
mod output;

use commands::article::ArticleArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(about = "Stockroom - offline-first businesses and articles")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage businesses
    Business {
        #[command(subcommand)]
        command: BusinessCommands,
    },
    /// Manage articles
    Article {
        #[command(subcommand)]
        command: ArticleCommands,
    },
    /// Replicate with the remote service once
    Sync,
    /// Keep replicating until interrupted
    Watch,
    /// Show replication backlog and settings
    Status,
    /// Export both collections as JSON
    Export {
        /// Output file (stdout if omitted)
        path: Option<PathBuf>,
    },
    /// Replace local data with an exported dump
    Import {
        /// Dump file written by `export`
        path: PathBuf,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum BusinessCommands {
    /// Create a business
    Add {
        /// Business name
        name: String,
    },
    /// List businesses
    #[command(alias = "ls")]
    List,
    /// Show business details
    Show {
        /// Business ID (full or prefix)
        id: String,
    },
    /// Rename a business
    Rename {
        /// Business ID (full or prefix)
        id: String,
        /// New name
        name: String,
    },
    /// Delete a business and its articles
    #[command(alias = "rm")]
    Delete {
        /// Business ID (full or prefix)
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ArticleCommands {
    /// Create an article
    Add {
        /// Owning business ID (full or prefix)
        #[arg(short, long)]
        business: String,
        /// Article name
        name: String,
        /// Quantity in stock
        #[arg(long, default_value_t = 0)]
        qty: u64,
        /// Selling price per unit
        #[arg(long, default_value_t = 0.0)]
        price: f64,
    },
    /// List articles
    #[command(alias = "ls")]
    List {
        /// Only articles of this business
        #[arg(short, long)]
        business: Option<String>,
    },
    /// Update article fields
    Update {
        /// Article ID (full or prefix)
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        qty: Option<u64>,
        #[arg(long)]
        price: Option<f64>,
        /// Move to another business
        #[arg(long)]
        business: Option<String>,
    },
    /// Delete an article
    #[command(alias = "rm")]
    Delete {
        /// Article ID (full or prefix)
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, remote_url, sync_enabled, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match run(cli, &output).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(hint) = e
                .downcast_ref::<StoreError>()
                .and_then(StoreError::recovery_suggestion)
            {
                eprintln!("{}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    let config_path = cli.config.as_ref();

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, output)
            }
        };
    }

    let config = Config::load_with_cli_override(config_path)?;
    init_logging(&config, cli.verbose);
    let store = Store::open_with_config(config)?;

    let wrote = match cli.command {
        Commands::Business { command } => handle_business_command(command, &store, output)?,
        Commands::Article { command } => handle_article_command(command, &store, output)?,
        Commands::Sync => {
            commands::sync::sync(&store, output).await?;
            false
        }
        Commands::Watch => {
            commands::watch::watch(&store, output).await?;
            false
        }
        Commands::Status => {
            commands::status::show(&store, output)?;
            false
        }
        Commands::Export { path } => {
            commands::transfer::export(&store, path, output)?;
            false
        }
        Commands::Import { path, yes } => commands::transfer::import(&store, path, yes, output)?,
        Commands::Config { .. } => false,
    };

    // Push local writes when the remote is configured
    if wrote {
        auto_sync(&store, output).await;
    }

    Ok(())
}

/// Run a business command; returns whether it wrote to the store
fn handle_business_command(
    command: BusinessCommands,
    store: &Store,
    output: &Output,
) -> Result<bool> {
    match command {
        BusinessCommands::Add { name } => commands::business::add(store, name, output).map(|_| true),
        BusinessCommands::List => commands::business::list(store, output).map(|_| false),
        BusinessCommands::Show { id } => commands::business::show(store, id, output).map(|_| false),
        BusinessCommands::Rename { id, name } => {
            commands::business::rename(store, id, name, output).map(|_| true)
        }
        BusinessCommands::Delete { id, yes } => commands::business::delete(store, id, yes, output),
    }
}

/// Run an article command; returns whether it wrote to the store
fn handle_article_command(
    command: ArticleCommands,
    store: &Store,
    output: &Output,
) -> Result<bool> {
    match command {
        ArticleCommands::Add {
            business,
            name,
            qty,
            price,
        } => commands::article::add(
            store,
            ArticleArgs {
                business,
                name,
                quantity: qty,
                price,
            },
            output,
        )
        .map(|_| true),
        ArticleCommands::List { business } => {
            commands::article::list(store, business, output).map(|_| false)
        }
        ArticleCommands::Update {
            id,
            name,
            qty,
            price,
            business,
        } => commands::article::update(
            store,
            id,
            ArticlePatch {
                name,
                quantity: qty,
                unit_price: price,
                business_id: business,
            },
            output,
        )
        .map(|_| true),
        ArticleCommands::Delete { id, yes } => commands::article::delete(store, id, yes, output),
    }
}

/// Best-effort pass after a write; failures only warn
async fn auto_sync(store: &Store, output: &Output) {
    match commands::sync::sync_quiet(store).await {
        Ok(None) | Ok(Some(PassOutcome::Completed(_))) => {}
        Ok(Some(outcome)) => {
            info!(%outcome, "Auto-sync skipped");
            if !output.is_quiet() {
                eprintln!("Saved locally; sync will retry later ({})", outcome);
            }
        }
        Err(e) => {
            if !output.is_quiet() {
                eprintln!("⚠ Auto-sync failed: {:#}", e);
            }
        }
    }
}

/// Initialize logging
///
/// `RUST_LOG` wins when set; otherwise the level follows `-v`. Logs go to
/// `log_file` when configured, stderr otherwise.
fn init_logging(config: &Config, verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("stockroom_core={},stockroom_cli={}", level, level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore the error if a subscriber is already installed
    match &config.log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
