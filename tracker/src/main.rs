//! Crop Lifecycle Tracker - command line client
//!
//! Shows where each of a farmer's crops is in its growth cycle and keeps the
//! local crop cache in sync with the backend crop store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crop_lifecycle_tracker::cache::{CropCache, FileCache};
use crop_lifecycle_tracker::external::{CropApiClient, RemoteCropStore};
use crop_lifecycle_tracker::services::{CropSyncService, SyncEvent};
use crop_lifecycle_tracker::{Config, TrackerError};
use shared::CropProfile;

#[derive(Parser)]
#[command(name = "crop-tracker", version, about = "Track crop growth stages")]
struct Cli {
    /// Override the configured farmer id
    #[arg(long, global = true)]
    farmer: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the current stage and progress of every crop
    Status {
        /// Reference date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Use cached data only
        #[arg(long)]
        offline: bool,
    },
    /// Show the scheduled window of each stage of one crop
    Timeline {
        crop_id: String,

        #[arg(long)]
        offline: bool,
    },
    /// Add a crop from a JSON profile file
    Add { file: PathBuf },
    /// Remove a crop
    Remove { crop_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crop_tracker=info,crop_lifecycle_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(farmer) = cli.farmer {
        config.farmer_id = farmer;
        config.validate().context("Invalid --farmer")?;
    }

    tracing::info!("Environment: {}", config.environment);
    tracing::info!("Farmer: {}", config.farmer_id);

    let remote: Arc<dyn RemoteCropStore> = Arc::new(CropApiClient::new(&config.api)?);
    let cache: Arc<dyn CropCache> = Arc::new(FileCache::new(config.cache.dir.clone()));
    let (service, mut events) =
        CropSyncService::spawn(config.farmer_id.clone(), remote, cache, config.sync.clone());

    service.cold_start().await?;

    match cli.command {
        Command::Status { date, offline } => {
            load(&service, offline).await;
            let reference = date.unwrap_or_else(|| Local::now().date_naive());
            print_status(&service, reference).await?;
        }
        Command::Timeline { crop_id, offline } => {
            load(&service, offline).await;
            for window in service.timeline(&crop_id).await? {
                println!(
                    "{:>2}. {:<24} {} -> {} ({} days)",
                    window.index + 1,
                    window.title,
                    window.window.start,
                    window.window.end,
                    window.window.days()
                );
            }
        }
        Command::Add { file } => {
            let json = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let stored = service.add(CropProfile::from_json(&json)?).await?;
            println!("Added {} ({})", stored.name, stored.crop_id);
            report_sync(&mut events).await;
        }
        Command::Remove { crop_id } => {
            service.remove(&crop_id).await?;
            println!("Removed {}", crop_id);
            report_sync(&mut events).await;
        }
    }

    service.shutdown().await;
    Ok(())
}

/// Refresh from the remote store unless offline, cached data stays on failure
async fn load(service: &CropSyncService, offline: bool) {
    if offline {
        return;
    }
    if let Err(e) = service.refresh().await {
        tracing::warn!(error = %e, "Remote refresh failed, showing cached crops");
        return;
    }
    // Push changes left pending by an earlier run
    service.resync().await;
}

async fn print_status(service: &CropSyncService, reference: NaiveDate) -> anyhow::Result<()> {
    let statuses = service.statuses(reference).await?;
    if statuses.is_empty() {
        println!("No crops tracked for farmer {}", service.farmer_id());
        return Ok(());
    }

    println!("Crop status on {}", reference);
    for status in statuses {
        let stage = status
            .current_stage()
            .map(|s| s.title.as_str())
            .unwrap_or("-");
        let marker = if status.resolution.lifecycle_complete {
            " (complete)"
        } else {
            ""
        };
        println!(
            "  {:<20} stage {}/{} {:<20} {:>3}%{}",
            status.profile.name,
            status.resolution.stage_index + 1,
            status.profile.stages.len(),
            stage,
            status.resolution.progress_percent,
            marker
        );
    }
    Ok(())
}

/// Wait for the sync worker to report on the change just made
async fn report_sync(events: &mut tokio::sync::mpsc::UnboundedReceiver<SyncEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SyncEvent::Synced { crop_id, op } => {
                println!("Synced {} ({})", crop_id, op);
                return;
            }
            SyncEvent::Failed(e @ TrackerError::RemoteSyncFailed { .. }) => {
                eprintln!("Sync pending [{}]: {}", e.code(), e);
                return;
            }
            SyncEvent::Failed(e) => eprintln!("Warning [{}]: {}", e.code(), e),
        }
    }
}
