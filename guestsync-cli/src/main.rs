mod commands;
mod logging;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use guestsync_core::client::RateLimitedClient;
use guestsync_core::config::Config;
use guestsync_core::sink::{BatchWriter, CsvSink, RecordSink, SqliteSink};
use guestsync_core::source::HttpEventSource;
use guestsync_core::state::StateStore;
use guestsync_core::syncer::{SyncOptions, Syncer};

#[derive(Parser)]
#[command(name = "guestsync")]
#[command(about = "Sync events and guest lists from an events API into spreadsheets and a database")]
struct Cli {
    /// Path to the config file (defaults to ~/.config/guestsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config file
    Init,
    /// Queue all events for a new sync run and write the event sheet
    Start {
        /// Only sync events starting after this date (YYYY-MM-DD)
        #[arg(long)]
        after: Option<String>,

        /// Only sync events starting before this date (YYYY-MM-DD)
        #[arg(long)]
        before: Option<String>,
    },
    /// Perform one unit of sync work (for external schedulers)
    Tick,
    /// Drive the sync to completion at a fixed interval
    Run {
        /// Seconds between work units
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
    /// Show sync progress
    Status {
        /// Emit machine-readable JSON instead of the human summary
        #[arg(long)]
        json: bool,
    },
    /// Stop the run without flushing buffered rows
    Stop,
    /// Reset sync state to its initial form
    Reset,
    /// Delete persisted sync state entirely
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("warn");
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init::run(cli.config.as_deref()),
        Commands::Start { after, before } => {
            let syncer = build_syncer(cli.config.as_deref())?;
            commands::start::run(&syncer, after.as_deref(), before.as_deref()).await
        }
        Commands::Tick => {
            let syncer = build_syncer(cli.config.as_deref())?;
            commands::tick::run(&syncer).await
        }
        Commands::Run { interval } => {
            let syncer = build_syncer(cli.config.as_deref())?;
            commands::run::run(&syncer, interval).await
        }
        Commands::Status { json } => {
            let config = load_config(cli.config.as_deref())?;
            let syncer = syncer_from_config(&config)?;
            commands::status::run(&syncer, &config, json).await
        }
        Commands::Stop => {
            let syncer = build_syncer(cli.config.as_deref())?;
            commands::stop::run(&syncer).await
        }
        Commands::Reset => {
            let syncer = build_syncer(cli.config.as_deref())?;
            commands::reset::run(&syncer)
        }
        Commands::Cleanup => {
            let syncer = build_syncer(cli.config.as_deref())?;
            commands::cleanup::run(&syncer)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

fn build_syncer(config_path: Option<&std::path::Path>) -> Result<Syncer> {
    let config = load_config(config_path)?;
    syncer_from_config(&config)
}

fn syncer_from_config(config: &Config) -> Result<Syncer> {
    let client = RateLimitedClient::new(&config.api)?;
    let source = HttpEventSource::new(client, &config.api.base_url)?;
    let tabular = CsvSink::new(&config.sink.output_dir);

    let records: Option<Box<dyn RecordSink>> = match &config.sink.database_path {
        Some(path) => Some(Box::new(
            SqliteSink::open(path).context("Failed to open database sink")?,
        )),
        None => None,
    };

    Ok(Syncer::new(
        Box::new(source),
        Box::new(tabular),
        records,
        BatchWriter::from_config(&config.sink),
        StateStore::new(config.state_path()?),
        SyncOptions::from_config(config),
    ))
}
