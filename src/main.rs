use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};

mod address;
mod config;
mod db;
mod error;
mod inventory;
mod lookup;
mod reconcile;
mod scan;
mod snmp;
mod utils;

use crate::address::Query;
use crate::config::{Config, Overrides};
use crate::db::StateStore;
use crate::error::TrackerError;
use crate::inventory::{Inventory, NetboxInventory, StaticInventory};
use crate::lookup::{render_history, render_locations};
use crate::scan::{LogSink, Orchestrator};
use crate::snmp::SnmpWalker;

/// Track which switch port every MAC address is attached to.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan every switch once and record where each MAC was seen
    Scan,
    /// Show where a full or partial MAC address is attached
    Lookup {
        /// Full address in any common notation, or a run of hex digits
        query: String,

        /// Also show each match's move history
        #[arg(long)]
        history: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Start with mactrack.toml, override with MACTRACK_* and then with flags.
    let config = match Config::load(&cli.overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Scan => scan(&config).await,
        Command::Lookup { query, history } => lookup(&config, &query, history).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            match e.downcast_ref::<TrackerError>() {
                Some(TrackerError::InvalidAddress(_)) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

// Runs log to the terminal and append to the log file.
fn init_run_log(config: &Config) -> anyhow::Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("failed to open log file {}", config.log_file))?;
    CombinedLogger::init(vec![
        TermLogger::new(
            config.log_level,
            simplelog::Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
        WriteLogger::new(config.log_level, simplelog::Config::default(), log_file),
    ])?;
    Ok(())
}

async fn scan(config: &Config) -> anyhow::Result<()> {
    init_run_log(config)?;

    let inventory: Arc<dyn Inventory> = match (&config.netbox_url, &config.netbox_token) {
        (Some(url), Some(token)) => Arc::new(NetboxInventory::new(url, token)),
        _ => Arc::new(StaticInventory::new(config.switches.clone())),
    };
    let source = Arc::new(SnmpWalker::new(
        &config.snmp_command,
        &config.snmp_community,
    )?);
    let store: Arc<dyn StateStore> = Arc::from(
        db::connect(config)
            .await
            .context("failed to open the state store")?,
    );

    Orchestrator::new(inventory, source, store, Arc::new(LogSink))
        .workers(config.workers)
        .scan_timeout(config.scan_timeout())
        .run()
        .await?;
    Ok(())
}

async fn lookup(config: &Config, query: &str, show_history: bool) -> anyhow::Result<()> {
    // Only problems go to the terminal; the tables go to stdout.
    TermLogger::init(
        LevelFilter::Warn,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    // Reject malformed input before touching the store.
    query.parse::<Query>()?;
    let store = db::connect(config)
        .await
        .context("failed to open the state store")?;

    let locations = lookup::lookup(store.as_ref(), query).await?;
    if locations.is_empty() {
        println!("No MACs found.");
        return Ok(());
    }
    println!("Current MAC Info:");
    println!("{}", render_locations(&locations));

    if show_history {
        let history = lookup::history(store.as_ref(), &locations).await?;
        for location in &locations {
            let moves: Vec<_> = history
                .iter()
                .filter(|event| event.mac == location.mac)
                .cloned()
                .collect();
            if moves.is_empty() {
                continue;
            }
            println!("\nHistory for {}:", location.mac);
            println!("{}", render_history(&moves));
        }
    }
    Ok(())
}
