//! Mnemo Retention Daemon - hosts the retention engine behind an admin API

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mnemo_retention::RetentionEngine;
use mnemo_retention::admin::{AdminServer, AppState};
use mnemo_retention::config::Config;
use mnemo_retention::error::Result;
use mnemo_retention::signals::PushedSignals;
use mnemo_retention::storage::InMemoryTierStore;

/// Mnemo Retention - keeps a companion's memories in the right storage tier
#[derive(Parser)]
#[command(name = "mnemo-retention")]
#[command(about = "Tiered memory retention engine with an admin API")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (default command)
    #[command(name = "serve")]
    Serve,
    /// Print the effective configuration as TOML
    #[command(name = "config")]
    ShowConfig,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
        Some(Command::ShowConfig) => show_config(cli.config),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mnemo_retention=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn show_config(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load(config_path.as_deref())?;
    let rendered = toml::to_string_pretty(&config)
        .map_err(|e| mnemo_retention::RetentionError::Serialization(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Mnemo retention daemon");

    let config = Config::load(config_path.as_deref())?;
    tracing::debug!("Config loaded: {:?}", config);

    let signals = Arc::new(PushedSignals::new());
    let store = Arc::new(InMemoryTierStore::new());
    let listen_addr = config.server.listen_addr.clone();
    let auto_start = config.optimizer.auto_start;

    let engine = Arc::new(RetentionEngine::new(config, signals.clone(), store)?);
    if auto_start {
        engine.start_scheduler();
    } else {
        tracing::info!("Scheduler disabled; passes run only on POST /optimize");
    }

    let server = AdminServer::new(listen_addr, Arc::new(AppState { engine, signals }));
    server.serve().await?;

    tracing::info!("Mnemo retention daemon stopped");
    Ok(())
}
