//! Owner of the installed schedule index.
//!
//! Readers take an `Arc` of the current index and keep using it for as long
//! as they like; a refresh builds a complete replacement off to the side and
//! swaps it in with a single pointer store.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::feed::{rows, CsvTable, FeedArchive, FeedTables};
use crate::identifiers::TripIdentifier;
use crate::models::types::*;
use crate::network::traits::{DataFetcher, KeyValueStore};
use crate::schedule::cache;
use crate::schedule::index::ScheduleIndex;
use crate::schedule::search::SearchResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshPhase {
    CheckingCache,
    Downloading,
    ParsingRoutes,
    ParsingStops,
    ParsingStopTimes,
    ParsingTrips,
    ParsingShapes,
    Persisting,
    Complete,
}

impl RefreshPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::CheckingCache => "Checking cache",
            Self::Downloading => "Downloading schedule",
            Self::ParsingRoutes => "Parsing routes",
            Self::ParsingStops => "Parsing stations",
            Self::ParsingStopTimes => "Parsing stop times",
            Self::ParsingTrips => "Parsing trips",
            Self::ParsingShapes => "Parsing route shapes",
            Self::Persisting => "Saving schedule",
            Self::Complete => "Complete",
        }
    }

    /// Rough share of the refresh done once this phase starts
    pub fn fraction(self) -> f32 {
        match self {
            Self::CheckingCache => 0.0,
            Self::Downloading => 0.05,
            Self::ParsingRoutes => 0.4,
            Self::ParsingStops => 0.45,
            Self::ParsingStopTimes => 0.5,
            Self::ParsingTrips => 0.75,
            Self::ParsingShapes => 0.8,
            Self::Persisting => 0.9,
            Self::Complete => 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefreshProgress {
    pub fraction: f32,
    pub phase: RefreshPhase,
}

impl From<RefreshPhase> for RefreshProgress {
    fn from(phase: RefreshPhase) -> Self {
        Self {
            fraction: phase.fraction(),
            phase,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RefreshSummary {
    pub routes: usize,
    pub stops: usize,
    pub trips: usize,
    pub shapes: usize,
    pub fetched_at: DateTime<Utc>,
    /// False when the new index is live but could not be written to the store
    pub persisted: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("schedule refresh failed during {}: {error}", .phase.label().to_lowercase())]
pub struct RefreshFailure {
    pub phase: RefreshPhase,
    #[source]
    pub error: TransitError,
}

pub type RefreshOutcome = std::result::Result<RefreshSummary, RefreshFailure>;

/// What [`ScheduleService::ensure_fresh`] ended up doing
#[derive(Debug)]
pub enum Freshness {
    /// The installed schedule was young enough
    Fresh,
    Refreshed(RefreshSummary),
    /// Refresh failed; an older schedule is still being served
    ServingStale(RefreshFailure),
    /// Refresh failed and there is nothing to serve
    Unavailable(RefreshFailure),
}

fn failed(phase: RefreshPhase) -> impl FnOnce(TransitError) -> RefreshFailure {
    move |error| RefreshFailure { phase, error }
}

/// Whether data fetched at `fetched_at` is older than `max_age_days` at `now`
pub fn is_stale_at(
    fetched_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_age_days: u32,
) -> bool {
    match fetched_at {
        None => true,
        Some(fetched_at) => now - fetched_at > TimeDelta::days(i64::from(max_age_days)),
    }
}

pub struct ScheduleService {
    feed_url: String,
    max_age_days: u32,
    fetcher: Arc<dyn DataFetcher>,
    store: Arc<dyn KeyValueStore>,
    installed: RwLock<Arc<ScheduleIndex>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl ScheduleService {
    pub fn new(
        config: &EngineConfig,
        fetcher: Arc<dyn DataFetcher>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            feed_url: config.static_feed_url.clone(),
            max_age_days: config.cache_max_age_days,
            fetcher,
            store,
            installed: RwLock::new(Arc::new(ScheduleIndex::empty())),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The index currently being served
    pub fn index(&self) -> Arc<ScheduleIndex> {
        Arc::clone(&self.installed.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn install(&self, index: ScheduleIndex) {
        *self.installed.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(index);
    }

    /// Install the persisted snapshot, if there is a usable one
    pub async fn load_from_cache(&self) -> bool {
        let _gate = self.refresh_gate.lock().await;

        match cache::read_snapshot(self.store.as_ref()).await {
            Ok(Some(snapshot)) => {
                let index = ScheduleIndex::from_snapshot(snapshot);
                info!(
                    routes = index.route_count(),
                    stops = index.stop_count(),
                    fetched_at = ?index.fetched_at(),
                    "loaded schedule from cache"
                );
                self.install(index);
                true
            }
            Ok(None) => {
                debug!("no cached schedule");
                false
            }
            Err(e) => {
                warn!("ignoring cached schedule: {e}");
                false
            }
        }
    }

    /// Download, parse and install the static feed.
    ///
    /// Runs one at a time; a second caller waits and then does its own full
    /// refresh. On failure the installed index is left as it was.
    pub async fn refresh<F>(&self, mut progress: F) -> RefreshOutcome
    where
        F: FnMut(RefreshProgress) + Send,
    {
        let _gate = self.refresh_gate.lock().await;
        let started = Instant::now();
        let mut report = |phase: RefreshPhase| progress(phase.into());

        report(RefreshPhase::CheckingCache);
        debug!(previous = ?self.index().fetched_at(), url = %self.feed_url, "refreshing schedule");

        report(RefreshPhase::Downloading);
        let bytes = self
            .fetcher
            .fetch(&self.feed_url)
            .await
            .map_err(failed(RefreshPhase::Downloading))?;
        debug!(bytes = bytes.len(), "downloaded static feed");

        let tables = parse_feed(&bytes, &mut report)?;
        drop(bytes);

        let fetched_at = Utc::now();
        let index = ScheduleIndex::build(tables, Some(fetched_at));
        let snapshot = index.to_snapshot(fetched_at);
        let mut summary = RefreshSummary {
            routes: index.route_count(),
            stops: index.stop_count(),
            trips: index.trip_count(),
            shapes: index.shape_count(),
            fetched_at,
            persisted: false,
        };
        self.install(index);

        report(RefreshPhase::Persisting);
        match cache::write_snapshot(self.store.as_ref(), &snapshot).await {
            Ok(()) => summary.persisted = true,
            Err(e) => warn!("refreshed schedule is live but was not persisted: {e}"),
        }

        report(RefreshPhase::Complete);
        info!(
            routes = summary.routes,
            stops = summary.stops,
            trips = summary.trips,
            persisted = summary.persisted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "schedule refreshed"
        );
        Ok(summary)
    }

    pub fn is_stale(&self, max_age_days: u32) -> bool {
        self.is_stale_at(Utc::now(), max_age_days)
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>, max_age_days: u32) -> bool {
        is_stale_at(self.index().fetched_at(), now, max_age_days)
    }

    /// Bring the schedule up to date with the configured maximum age,
    /// loading the cache first when nothing is installed yet
    pub async fn ensure_fresh<F>(&self, progress: F) -> Freshness
    where
        F: FnMut(RefreshProgress) + Send,
    {
        if self.index().fetched_at().is_none() {
            self.load_from_cache().await;
        }
        if !self.is_stale(self.max_age_days) {
            return Freshness::Fresh;
        }

        match self.refresh(progress).await {
            Ok(summary) => Freshness::Refreshed(summary),
            Err(failure) if self.index().fetched_at().is_some() => {
                warn!("{failure}; serving the previous schedule");
                Freshness::ServingStale(failure)
            }
            Err(failure) => Freshness::Unavailable(failure),
        }
    }

    // ---- Queries against the installed index ----

    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        self.index().search(query)
    }

    pub fn stop_times_for_trip(&self, trip_id: &str) -> Vec<StopTimeView> {
        self.index().stop_times_for_trip(trip_id)
    }

    pub fn intermediate_stops(&self, trip_id: &str) -> Vec<StopTimeView> {
        self.index().intermediate_stops(trip_id)
    }

    pub fn trips_for_stop(&self, stop_id: &str) -> Vec<TripIdentifier> {
        self.index().trips_for_stop(stop_id).to_vec()
    }

    pub fn stop(&self, stop_id: &str) -> Option<Arc<Stop>> {
        self.index().stop(stop_id).cloned()
    }

    pub fn route(&self, route_id: &str) -> Option<Arc<Route>> {
        self.index().route(route_id).cloned()
    }

    pub fn stop_name(&self, stop_id: &str) -> Option<String> {
        self.index().stop_name(stop_id).map(str::to_string)
    }
}

fn optional_table<T>(
    archive: &mut FeedArchive<'_>,
    name: &str,
    parse: fn(&CsvTable) -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    match archive.table(name)? {
        Some(table) => parse(&table),
        None => Ok(Vec::new()),
    }
}

/// Parse the downloaded archive table by table, reporting each phase
fn parse_feed(
    bytes: &[u8],
    report: &mut impl FnMut(RefreshPhase),
) -> std::result::Result<FeedTables, RefreshFailure> {
    use RefreshPhase::*;

    report(ParsingRoutes);
    let mut archive = FeedArchive::from_bytes(bytes).map_err(failed(ParsingRoutes))?;
    let routes = archive
        .required_table("routes")
        .and_then(|table| rows::parse_routes(&table))
        .map_err(failed(ParsingRoutes))?;

    report(ParsingStops);
    let stops = archive
        .required_table("stops")
        .and_then(|table| rows::parse_stops(&table))
        .map_err(failed(ParsingStops))?;

    report(ParsingStopTimes);
    let stop_times = archive
        .required_table("stop_times")
        .and_then(|table| rows::parse_stop_times(&table))
        .map_err(failed(ParsingStopTimes))?;

    report(ParsingTrips);
    let trips = optional_table(&mut archive, "trips", rows::parse_trips)
        .map_err(failed(ParsingTrips))?;
    let calendars = (|| {
        let calendar = archive.table("calendar")?;
        let dates = archive.table("calendar_dates")?;
        rows::parse_calendars(calendar.as_ref(), dates.as_ref())
    })()
    .map_err(failed(ParsingTrips))?;

    report(ParsingShapes);
    let shapes = optional_table(&mut archive, "shapes", rows::parse_shapes)
        .map_err(failed(ParsingShapes))?;

    Ok(FeedTables {
        routes,
        stops,
        stop_times,
        shapes,
        trips,
        calendars,
    })
}
