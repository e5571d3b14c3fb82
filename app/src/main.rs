// In app/src/main.rs

use anyhow::{Context, Result};
use app_config::Settings;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use engine::Engine;
use events::{Deduplicator, EventBus, LifecycleEvent, Subscription};
use execution::BookSnapshot;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;

mod report;
mod tracing_layer;

use crate::tracing_layer::{RecentLog, RecentLogLayer};

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "A signal-driven position and risk engine.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the timer-driven engine against the simulated market until Ctrl-C.
    Run {
        /// Stop on its own after this many seconds.
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Runs a deterministic, timer-less session and prints a summary.
    Simulate {
        /// Number of revaluation + signal rounds.
        #[arg(short, long, default_value_t = 1_000)]
        steps: u64,

        /// Overrides `simulation.seed`.
        #[arg(long)]
        seed: Option<u64>,
    },
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = app_config::load_settings().context("failed to load settings")?;
    let recent = init_tracing(&settings.app.log_level)?;

    tracing::info!(
        environment = %settings.app.environment,
        tier = %settings.strategy.active_tier,
        "Starting signal-desk"
    );

    // The bus is built here and handed to the engine; nothing is global.
    let bus = EventBus::new(settings.engine.max_redeliveries);
    let journal = attach_journal(&bus);

    let snapshot = match cli.command {
        Commands::Run { duration_secs } => run_app(&settings, bus.clone(), duration_secs).await?,
        Commands::Simulate { steps, seed } => {
            handle_simulate(&settings, bus.clone(), steps, seed).await?
        }
    };
    journal.unsubscribe();

    report::print_session_report(settings.initial_balance()?, &snapshot, &recent);
    tracing::info!("signal-desk has finished successfully.");
    Ok(())
}

/// Installs the fmt layer plus the in-memory warning log used by the report.
fn init_tracing(log_level: &str) -> Result<RecentLog> {
    let level = tracing::Level::from_str(log_level)
        .map_err(|_| anyhow::anyhow!("invalid app.log_level `{log_level}`"))?;

    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        Targets::new()
            .with_target("market_sim", tracing::Level::INFO)
            .with_default(level),
    );
    let (recent_layer, recent) = RecentLogLayer::new();
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(recent_layer.with_filter(LevelFilter::WARN))
        .init();
    Ok(recent)
}

/// Logs every lifecycle event once, as JSON.
fn attach_journal(bus: &EventBus) -> Subscription {
    let mut dedup = Deduplicator::new();
    bus.subscribe(move |event: &LifecycleEvent| {
        if !dedup.first_sight(event) {
            return Ok(());
        }
        let json = serde_json::to_string(event)
            .map_err(|e| events::DeliveryError(e.to_string()))?;
        match event {
            LifecycleEvent::PositionRevalued(_) => tracing::trace!(target: "journal", %json),
            _ => tracing::debug!(target: "journal", %json),
        }
        Ok(())
    })
}

// --- "Run" Subcommand Logic ---

/// Runs the engine with its timers until Ctrl-C or the optional duration.
async fn run_app(settings: &Settings, bus: EventBus, duration_secs: Option<u64>) -> Result<BookSnapshot> {
    let engine = Engine::from_settings(settings, bus)?;
    let (feed, source) = market_sim::from_settings(&settings.simulation, settings.simulation.seed);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match duration_secs {
            Some(secs) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        tracing::info!("Shutdown requested.");
        let _ = shutdown_tx.send(true);
    });

    engine.run(feed, source, shutdown_rx).await
}

// --- "Simulate" Subcommand Logic ---

/// Runs a seeded session on a simulated clock.
async fn handle_simulate(
    settings: &Settings,
    bus: EventBus,
    steps: u64,
    seed: Option<u64>,
) -> Result<BookSnapshot> {
    let seed = seed.unwrap_or(settings.simulation.seed);
    let engine = Engine::from_settings(settings, bus)?;
    let (feed, source) = market_sim::from_settings(&settings.simulation, seed);

    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .context("invalid simulation start time")?;
    tracing::info!(steps, seed, "Running simulation.");
    engine.simulate(feed, source, steps, start).await
}
