use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use repack_core::RepackConfig;
use repack_devices::DeviceStore;
use repack_notify::Delivery;
use repack_scheduler::{evaluator, ReminderEngine, ReminderStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Repack reminder daemon: emails owners when their rescue devices are due.
#[derive(Parser)]
#[command(name = "repack-daemon", version, about)]
struct Cli {
    /// Path to repack.toml (falls back to REPACK_CONFIG, then ~/.repack/repack.toml).
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daily reminder loop until Ctrl+C.
    Serve,

    /// Run a single reminder batch and print its summary as JSON.
    RunOnce {
        /// Evaluate as of this RFC 3339 instant instead of now.
        #[arg(long)]
        now: Option<String>,
    },

    /// Show every device's reminder state and due dates.
    Status,

    /// List owners with their device counts.
    Owners,

    /// Send a test message to check the delivery settings.
    TestNotify {
        /// Address to send the test message to.
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repack_daemon=info,repack_scheduler=info,repack_notify=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    let command = cli.command.unwrap_or(Command::Serve);
    if let Command::TestNotify { address } = &command {
        return test_notify(&config, address).await;
    }

    let store = open_store(&config.database.path)?;
    match command {
        Command::Serve => serve(config, store).await,
        Command::RunOnce { now } => run_once(config, store, now.as_deref()).await,
        Command::Status => status(&store),
        Command::Owners => owners(&store),
        Command::TestNotify { .. } => Ok(()),
    }
}

/// `--config`, else `REPACK_CONFIG`, else `~/.repack/repack.toml`.
///
/// A missing file means defaults. A file that exists but does not parse or
/// validate is an error.
fn load_config(explicit: Option<String>) -> anyhow::Result<RepackConfig> {
    let path = explicit.or_else(|| std::env::var("REPACK_CONFIG").ok());
    let shown = path.clone().unwrap_or_else(|| "~/.repack/repack.toml".to_string());
    RepackConfig::load(path.as_deref()).with_context(|| format!("loading config {shown}"))
}

fn open_store(db_path: &str) -> anyhow::Result<Arc<DeviceStore>> {
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let conn = rusqlite::Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(Arc::new(DeviceStore::new(conn)?))
}

fn build_engine(config: &RepackConfig, store: Arc<DeviceStore>) -> anyhow::Result<ReminderEngine> {
    let dispatcher = repack_notify::from_config(&config.notify)?;
    info!(dispatcher = dispatcher.name(), "notification dispatcher ready");
    let store: Arc<dyn ReminderStore> = store;
    Ok(ReminderEngine::new(store, dispatcher, config.scheduler.clone()))
}

async fn serve(config: RepackConfig, store: Arc<DeviceStore>) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(&config, store)?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(shutdown_rx).await;
    Ok(())
}

async fn run_once(
    config: RepackConfig,
    store: Arc<DeviceStore>,
    now: Option<&str>,
) -> anyhow::Result<()> {
    let now = match now {
        Some(s) => parse_instant(s)?,
        None => Utc::now(),
    };
    let engine = build_engine(&config, store)?;
    let summary = engine.run_once(now).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn status(store: &DeviceStore) -> anyhow::Result<()> {
    let now = Utc::now();
    let listing = store.list_all_devices()?;
    if listing.unreadable > 0 {
        warn!(unreadable = listing.unreadable, "some device rows could not be read");
        println!("{} device row(s) could not be read and are not shown.", listing.unreadable);
    }
    let devices = listing.devices;
    if devices.is_empty() {
        println!("No devices registered.");
        return Ok(());
    }
    println!(
        "{:>5}  {:<24} {:<28} {:<16} {:<10} {:<10} {}",
        "ID", "DEVICE", "OWNER", "STATE", "DUE", "ESCALATE", "NEXT"
    );
    for record in &devices {
        let s = evaluator::status(record, now);
        let next = if s.eligible {
            s.next_action.to_string()
        } else {
            "disabled".to_string()
        };
        println!(
            "{:>5}  {:<24} {:<28} {:<16} {:<10} {:<10} {}",
            s.device_id.to_string(),
            truncate(&s.device_name, 24),
            truncate(&s.owner_email, 28),
            s.state.to_string(),
            s.due_date.format("%Y-%m-%d").to_string(),
            s.escalation_date.format("%Y-%m-%d").to_string(),
            next,
        );
    }
    Ok(())
}

fn owners(store: &DeviceStore) -> anyhow::Result<()> {
    let owners = store.list_owners()?;
    if owners.is_empty() {
        println!("No owners registered.");
        return Ok(());
    }
    println!("{:>5}  {:<28} {:<24} {:<8} {}", "ID", "EMAIL", "NAME", "ACTIVE", "DEVICES");
    for s in &owners {
        println!(
            "{:>5}  {:<28} {:<24} {:<8} {}",
            s.owner.id.to_string(),
            truncate(&s.owner.email, 28),
            truncate(&s.owner.display_name(), 24),
            if s.owner.is_active { "yes" } else { "no" },
            s.device_count,
        );
    }
    Ok(())
}

async fn test_notify(config: &RepackConfig, address: &str) -> anyhow::Result<()> {
    let dispatcher = repack_notify::from_config(&config.notify)?;
    let delivery = dispatcher
        .send_test(address)
        .await
        .with_context(|| format!("test message to {address} failed"))?;
    println!("{}", describe_test_delivery(delivery, address, dispatcher.name()));
    Ok(())
}

fn describe_test_delivery(delivery: Delivery, address: &str, via: &str) -> String {
    match delivery {
        Delivery::Delivered => format!("Test message to {address} accepted by the {via} dispatcher."),
        Delivery::DryRun => format!(
            "Test message to {address} rendered and logged only; set notify.mode = \"webhook\" to deliver."
        ),
    }
}

fn parse_instant(s: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("--now must be RFC 3339 (e.g. 2024-07-15T09:00:00Z), got {s:?}"))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
