//! Persisted form of a schedule index.
//!
//! The snapshot is spread over several keys of a [`KeyValueStore`], one JSON
//! document per table plus an RFC 3339 timestamp. The timestamp is blanked
//! before the tables are written and set again last, so a half-written
//! snapshot never loads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::feed::FeedTables;
use crate::identifiers::{ShapeIdentifier, TripIdentifier};
use crate::models::calendar::ServiceCalendar;
use crate::models::types::*;
use crate::network::traits::KeyValueStore;

pub mod keys {
    pub const ROUTES: &str = "railwatch.gtfs.routes";
    pub const STOPS: &str = "railwatch.gtfs.stops";
    pub const STOP_TIMES: &str = "railwatch.gtfs.stop_times";
    pub const SHAPES: &str = "railwatch.gtfs.shapes";
    pub const TRIPS: &str = "railwatch.gtfs.trips";
    pub const CALENDARS: &str = "railwatch.gtfs.calendars";
    pub const LAST_FETCH: &str = "railwatch.gtfs.last_fetch";
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub routes: Vec<Route>,
    pub stops: Vec<Stop>,
    pub stop_times: BTreeMap<TripIdentifier, Vec<StopTime>>,
    pub shapes: BTreeMap<ShapeIdentifier, Vec<ShapePoint>>,
    pub trips: Vec<Trip>,
    pub calendars: Vec<ServiceCalendar>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheSnapshot {
    pub fn into_tables(self) -> FeedTables {
        let shapes = self
            .shapes
            .into_iter()
            .flat_map(|(shape_id, points)| {
                points.into_iter().map(move |point| ShapeRow {
                    shape_id: shape_id.clone(),
                    point,
                })
            })
            .collect();

        FeedTables {
            routes: self.routes,
            stops: self.stops,
            stop_times: self.stop_times.into_values().flatten().collect(),
            shapes,
            trips: self.trips,
            calendars: self.calendars,
        }
    }
}

/// Read the snapshot back.
///
/// `Ok(None)` when nothing was ever persisted. Missing required tables or
/// unparsable JSON are [`TransitError::CacheCorrupt`].
pub async fn read_snapshot(store: &dyn KeyValueStore) -> Result<Option<CacheSnapshot>> {
    let Some(stamp) = store.get(keys::LAST_FETCH).await? else {
        return Ok(None);
    };
    let fetched_at = DateTime::parse_from_rfc3339(stamp.trim())
        .map_err(|e| TransitError::CacheCorrupt(format!("{}: {e}", keys::LAST_FETCH)))?
        .with_timezone(&Utc);

    let snapshot = CacheSnapshot {
        routes: required(store, keys::ROUTES).await?,
        stops: required(store, keys::STOPS).await?,
        stop_times: required(store, keys::STOP_TIMES).await?,
        shapes: optional(store, keys::SHAPES).await?,
        trips: optional(store, keys::TRIPS).await?,
        calendars: optional(store, keys::CALENDARS).await?,
        fetched_at,
    };

    debug!(
        routes = snapshot.routes.len(),
        stops = snapshot.stops.len(),
        %fetched_at,
        "read cached schedule"
    );
    Ok(Some(snapshot))
}

pub async fn write_snapshot(store: &dyn KeyValueStore, snapshot: &CacheSnapshot) -> Result<()> {
    store.set(keys::LAST_FETCH, String::new()).await?;

    store.set(keys::ROUTES, encode(&snapshot.routes)?).await?;
    store.set(keys::STOPS, encode(&snapshot.stops)?).await?;
    store.set(keys::STOP_TIMES, encode(&snapshot.stop_times)?).await?;
    store.set(keys::SHAPES, encode(&snapshot.shapes)?).await?;
    store.set(keys::TRIPS, encode(&snapshot.trips)?).await?;
    store.set(keys::CALENDARS, encode(&snapshot.calendars)?).await?;

    store
        .set(keys::LAST_FETCH, snapshot.fetched_at.to_rfc3339())
        .await?;
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| TransitError::Storage(format!("encoding snapshot: {e}")))
}

async fn required<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<T> {
    let raw = store
        .get(key)
        .await?
        .ok_or_else(|| TransitError::CacheCorrupt(format!("{key} missing")))?;
    decode(key, &raw)
}

async fn optional<T: DeserializeOwned + Default>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<T> {
    match store.get(key).await? {
        Some(raw) => decode(key, &raw),
        None => Ok(T::default()),
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| TransitError::CacheCorrupt(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::store::MemoryStore;
    use crate::schedule::index::{fixtures, ScheduleIndex};

    fn snapshot() -> CacheSnapshot {
        let fetched_at = DateTime::parse_from_rfc3339("2026-01-16T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ScheduleIndex::build(fixtures::corridor(), Some(fetched_at)).to_snapshot(fetched_at)
    }

    #[tokio::test]
    async fn test_empty_store_has_no_snapshot() {
        let store = MemoryStore::new();
        assert_eq!(read_snapshot(&store).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = MemoryStore::new();
        let original = snapshot();

        write_snapshot(&store, &original).await.unwrap();
        let restored = read_snapshot(&store).await.unwrap().unwrap();

        assert_eq!(restored, original);
        assert_eq!(
            store.get(keys::LAST_FETCH).await.unwrap().as_deref(),
            Some("2026-01-16T08:00:00+00:00")
        );
    }

    #[tokio::test]
    async fn test_optional_tables_default_to_empty() {
        let store = MemoryStore::new();
        let original = snapshot();
        store.set(keys::ROUTES, encode(&original.routes).unwrap()).await.unwrap();
        store.set(keys::STOPS, encode(&original.stops).unwrap()).await.unwrap();
        store.set(keys::STOP_TIMES, encode(&original.stop_times).unwrap()).await.unwrap();
        store.set(keys::LAST_FETCH, original.fetched_at.to_rfc3339()).await.unwrap();

        let restored = read_snapshot(&store).await.unwrap().unwrap();
        assert!(restored.trips.is_empty());
        assert!(restored.shapes.is_empty());
        assert_eq!(restored.stops, original.stops);
    }

    #[tokio::test]
    async fn test_unreadable_table_is_corrupt() {
        let store = MemoryStore::new();
        write_snapshot(&store, &snapshot()).await.unwrap();
        store.set(keys::STOPS, "{not json".into()).await.unwrap();

        assert!(matches!(
            read_snapshot(&store).await,
            Err(TransitError::CacheCorrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_timestamp_is_corrupt() {
        let store = MemoryStore::new();
        write_snapshot(&store, &snapshot()).await.unwrap();
        store.set(keys::LAST_FETCH, String::new()).await.unwrap();

        assert!(matches!(
            read_snapshot(&store).await,
            Err(TransitError::CacheCorrupt(_))
        ));
    }
}
