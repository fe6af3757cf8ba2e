//! Time-to-live cache in front of the realtime feed.
//!
//! Queries within the TTL reuse the last decoded snapshot. Once it expires the
//! next query starts a fetch, and every query arriving while that fetch runs
//! awaits the same shared future instead of starting its own.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::network::traits::DataFetcher;
use crate::realtime::overlay::{ActiveTrain, RealtimeDelay, RealtimePosition, RealtimeSnapshot};
use crate::schedule::ScheduleService;

type SharedFetch = Shared<BoxFuture<'static, Arc<RealtimeSnapshot>>>;

struct OverlayState {
    current: Arc<RealtimeSnapshot>,
    /// When the last fetch finished, successful or not
    checked_at: Option<Instant>,
    in_flight: Option<SharedFetch>,
}

impl OverlayState {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.checked_at.is_some_and(|at| at.elapsed() < ttl)
    }
}

pub struct RealtimeService {
    feed_url: Option<String>,
    ttl: Duration,
    fetcher: Arc<dyn DataFetcher>,
    schedule: Option<Arc<ScheduleService>>,
    state: Arc<Mutex<OverlayState>>,
}

impl RealtimeService {
    pub fn new(config: &EngineConfig, fetcher: Arc<dyn DataFetcher>) -> Self {
        Self {
            feed_url: config.realtime_feed_url.clone(),
            ttl: config.realtime_ttl(),
            fetcher,
            schedule: None,
            state: Arc::new(Mutex::new(OverlayState {
                current: Arc::new(RealtimeSnapshot::empty()),
                checked_at: None,
                in_flight: None,
            })),
        }
    }

    /// Reconcile train numbers against the static trips table
    pub fn with_schedule(mut self, schedule: Arc<ScheduleService>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// The current snapshot, fetching a new one if the TTL has run out.
    ///
    /// Never fails: a failed fetch keeps serving the previous snapshot, or an
    /// empty one if nothing has loaded yet.
    pub async fn snapshot(&self) -> Arc<RealtimeSnapshot> {
        let Some(url) = self.feed_url.as_ref() else {
            return self.cached();
        };

        let fetch = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_fresh(self.ttl) {
                return Arc::clone(&state.current);
            }
            match &state.in_flight {
                Some(fetch) => fetch.clone(),
                None => {
                    let fetch = self.start_fetch(url.clone());
                    state.in_flight = Some(fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Whatever snapshot is held right now, without fetching
    pub fn cached(&self) -> Arc<RealtimeSnapshot> {
        Arc::clone(&self.state.lock().unwrap_or_else(PoisonError::into_inner).current)
    }

    fn start_fetch(&self, url: String) -> SharedFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let state = Arc::clone(&self.state);
        let index = self.schedule.as_ref().map(|s| s.index());

        async move {
            let decoded = match fetcher.fetch(&url).await {
                Ok(bytes) => RealtimeSnapshot::decode(&bytes, index.as_deref(), Utc::now()),
                Err(e) => Err(e),
            };

            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            match decoded {
                Ok(snapshot) => {
                    debug!(
                        positions = snapshot.position_count(),
                        trip_updates = snapshot.trip_update_count(),
                        "realtime snapshot replaced"
                    );
                    state.current = Arc::new(snapshot);
                }
                Err(e) => warn!("realtime fetch failed, keeping previous data: {e}"),
            }
            state.checked_at = Some(Instant::now());
            state.in_flight = None;
            Arc::clone(&state.current)
        }
        .boxed()
        .shared()
    }

    // ---- Queries against the current snapshot ----

    pub async fn position_for_trip(&self, key: &str) -> Option<RealtimePosition> {
        self.snapshot().await.position_for_trip(key).cloned()
    }

    pub async fn delays_for_trip(&self, key: &str) -> Vec<RealtimeDelay> {
        self.snapshot().await.delays_for_trip(key).to_vec()
    }

    pub async fn delay_for_stop(&self, key: &str, stop_id: &str) -> Option<i32> {
        self.snapshot().await.delay_for_stop(key, stop_id)
    }

    /// Delay at a stop, carried forward along the static stop order when a
    /// schedule is attached
    pub async fn propagated_delay(&self, key: &str, stop_id: &str) -> Option<i32> {
        let snapshot = self.snapshot().await;
        match &self.schedule {
            Some(schedule) => snapshot.propagated_delay(key, stop_id, &schedule.index()),
            None => snapshot.delay_for_stop(key, stop_id),
        }
    }

    pub async fn all_active_trains(&self) -> Vec<ActiveTrain> {
        self.snapshot().await.all_active_trains()
    }
}
