use cafeos::application::analytics::summarize;
use cafeos::application::engine::CafeEngine;
use cafeos::config::EngineConfig;
use cafeos::domain::clock::{Clock, SystemClock};
use cafeos::domain::ports::RecordStoreBox;
use cafeos::infrastructure::in_memory::InMemoryStore;
use cafeos::interfaces::csv::command_reader::CommandReader;
use cafeos::interfaces::csv::report_writer::ReportWriter;
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Report {
    Purchases,
    CheckIns,
    Revenue,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Report printed to stdout once every command has been applied
    #[arg(long, value_enum, default_value = "purchases")]
    report: Report,

    /// TOML configuration file, overridden by CAFEOS_* environment variables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[cfg_attr(not(feature = "storage-rocksdb"), allow(unused_variables))]
fn open_store(cli: &Cli) -> Result<RecordStoreBox> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = &cli.db_path {
        let store = cafeos::infrastructure::rocksdb::RocksDbStore::open(db_path).into_diagnostic()?;
        return Ok(Box::new(store));
    }
    Ok(Box::new(InMemoryStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = EngineConfig::load(cli.config.as_deref()).into_diagnostic()?;
    let engine = CafeEngine::new(open_store(&cli)?, config);

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    let mut last_at = None;
    let mut applied = 0usize;
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Some(at) = command.at() {
                    last_at = Some(at);
                }
                match engine.process_command(command).await {
                    Ok(()) => applied += 1,
                    Err(e) => warn!("Error processing command: {}", e),
                }
            }
            Err(e) => warn!("Error reading command: {}", e),
        }
    }
    info!(applied, "replay finished");

    let now = last_at.unwrap_or_else(|| SystemClock.now());
    let snapshot = engine.snapshot().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    match cli.report {
        Report::Purchases => writer.write_purchases(&snapshot, now),
        Report::CheckIns => writer.write_check_ins(&snapshot, now),
        Report::Revenue => writer.write_revenue(&summarize(&snapshot, now)),
    }
    .into_diagnostic()?;

    Ok(())
}
