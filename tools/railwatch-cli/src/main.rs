use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use railwatch_transit::network::{DirectoryStore, HttpFetcher};
use railwatch_transit::prelude::*;
use tracing_subscriber::EnvFilter;

mod commands;
mod settings;

#[derive(Parser, Debug)]
#[command(
    name = "railwatch",
    author,
    version,
    about = "Rail schedules and live train positions",
    long_about = "Downloads a GTFS schedule, keeps it cached on disk and answers \
                  questions about stations, trips and trains. With a realtime feed \
                  configured, live positions and delays are overlaid on the schedule.\n\n\
                  Settings come from an optional TOML file and RAILWATCH_* environment \
                  variables, e.g. RAILWATCH_REALTIME_FEED_URL."
)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the cached schedule
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Verbose output (show debug messages)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the static schedule if the cached copy is stale
    Refresh {
        /// Download even if the cache is still fresh
        #[arg(long)]
        force: bool,
    },
    /// Search stations, routes and train numbers
    Search { query: String },
    /// Show every stop of a trip
    Trip {
        trip_id: String,
        /// Overlay live delays
        #[arg(long)]
        live: bool,
    },
    /// List trips calling at a station
    Stop {
        stop_id: String,
        #[arg(short, long, default_value_t = 15)]
        limit: usize,
    },
    /// Live position and delays of a train
    Train { number: String },
    /// Group stations (or live trains) for a viewport width
    Clusters {
        /// Viewport width in degrees of longitude
        #[arg(long)]
        zoom: f64,
        /// Cluster live trains instead of stations
        #[arg(long)]
        trains: bool,
    },
}

pub struct Engine {
    pub config: EngineConfig,
    pub schedule: Arc<ScheduleService>,
    pub realtime: RealtimeService,
}

fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    Ok(pb)
}

fn report_to(pb: &ProgressBar) -> impl FnMut(RefreshProgress) + Send + '_ {
    move |progress| {
        pb.set_message(format!(
            "{} ({:.0}%)",
            progress.phase.label(),
            progress.fraction * 100.0
        ));
        pb.tick();
    }
}

impl Engine {
    fn new(config: EngineConfig, cache_dir: PathBuf) -> Result<Self> {
        let fetcher: Arc<dyn DataFetcher> = Arc::new(
            HttpFetcher::new(config.http_timeout()).context("Failed to build HTTP client")?,
        );
        let store = Arc::new(DirectoryStore::new(cache_dir));

        let schedule = Arc::new(ScheduleService::new(&config, fetcher.clone(), store));
        let realtime = RealtimeService::new(&config, fetcher).with_schedule(schedule.clone());

        Ok(Self {
            config,
            schedule,
            realtime,
        })
    }

    /// Make sure some schedule is installed, refreshing when stale
    async fn ready(&self) -> Result<()> {
        let pb = spinner()?;
        let freshness = self.schedule.ensure_fresh(report_to(&pb)).await;
        pb.finish_and_clear();

        match freshness {
            Freshness::Fresh | Freshness::Refreshed(_) => Ok(()),
            Freshness::ServingStale(failure) => {
                tracing::warn!("using an outdated schedule: {failure}");
                Ok(())
            }
            Freshness::Unavailable(failure) => {
                Err(failure).context("No schedule available; check the network and try again")
            }
        }
    }

    async fn refresh(&self, force: bool) -> Result<()> {
        let cached = self.schedule.load_from_cache().await;
        if cached && !force && !self.schedule.is_stale(self.config.cache_max_age_days) {
            let index = self.schedule.index();
            println!(
                "Schedule is up to date ({} stations, {} trips, fetched {})",
                index.stop_count(),
                index.trip_count(),
                index
                    .fetched_at()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".into())
            );
            return Ok(());
        }

        let pb = spinner()?;
        let outcome = self.schedule.refresh(report_to(&pb)).await;
        pb.finish_and_clear();

        let summary = outcome.context("Schedule refresh failed")?;
        println!(
            "Fetched {} routes, {} stations, {} trips, {} shapes",
            summary.routes, summary.stops, summary.trips, summary.shapes
        );
        if !summary.persisted {
            println!("Warning: the schedule could not be saved; it will be downloaded again");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    if let Some(path) = &args.config {
        if !path.exists() {
            bail!("Config file does not exist: {}", path.display());
        }
    }
    let settings = settings::load(args.config.as_deref(), args.cache_dir.clone())?;
    tracing::debug!(cache_dir = %settings.cache_dir.display(), "settings loaded");

    let engine = Engine::new(settings.engine, settings.cache_dir)?;

    match args.command {
        Command::Refresh { force } => engine.refresh(force).await,
        Command::Search { query } => {
            engine.ready().await?;
            commands::search(&engine, &query)
        }
        Command::Trip { trip_id, live } => {
            engine.ready().await?;
            commands::trip(&engine, &trip_id, live).await
        }
        Command::Stop { stop_id, limit } => {
            engine.ready().await?;
            commands::stop(&engine, &stop_id, limit)
        }
        Command::Train { number } => {
            engine.ready().await?;
            commands::train(&engine, &number).await
        }
        Command::Clusters { zoom, trains } => {
            engine.ready().await?;
            commands::clusters(&engine, zoom, trains).await
        }
    }
}
