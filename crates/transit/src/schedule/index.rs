//! Immutable, queryable view of one static feed.
//!
//! An index is built once from parsed tables (or a cached snapshot) and never
//! mutated afterwards. Refreshing the schedule builds a new index and swaps it
//! in whole, see [`crate::schedule::ScheduleService`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use geo::Point;
use rstar::RTree;
use tracing::{debug, warn};

use crate::feed::FeedTables;
use crate::identifiers::*;
use crate::models::calendar::ServiceCalendar;
use crate::models::types::*;
use crate::realtime::reconcile::{extract_train_number, normalize_train_number};
use crate::schedule::cache::CacheSnapshot;
use crate::spatial::index::{self as stop_index, StopNode};
use crate::time::service_seconds;

pub struct ScheduleIndex {
    routes: HashMap<RouteIdentifier, Arc<Route>>,
    stops: HashMap<StopIdentifier, Arc<Stop>>,
    stop_times: HashMap<TripIdentifier, Vec<StopTime>>,
    shapes: HashMap<ShapeIdentifier, Vec<ShapePoint>>,
    trips: HashMap<TripIdentifier, Arc<Trip>>,
    calendars: HashMap<ServiceIdentifier, ServiceCalendar>,
    trips_by_stop: HashMap<StopIdentifier, Vec<TripIdentifier>>,
    stop_tree: RTree<StopNode>,
    fetched_at: Option<DateTime<Utc>>,
}

impl ScheduleIndex {
    /// An index with no data, installed before anything has loaded
    pub fn empty() -> Self {
        Self::build(FeedTables::default(), None)
    }

    pub fn build(tables: FeedTables, fetched_at: Option<DateTime<Utc>>) -> Self {
        let FeedTables {
            routes,
            stops,
            stop_times,
            shapes,
            trips,
            calendars,
        } = tables;

        let routes: HashMap<_, _> = routes
            .into_iter()
            .map(|r| (r.id.clone(), Arc::new(r)))
            .collect();

        let stops: HashMap<_, _> = stops
            .into_iter()
            .map(|s| (s.id.clone(), Arc::new(s)))
            .collect();

        let stop_tree = RTree::bulk_load(stops.values().cloned().map(StopNode::new).collect());

        let stop_times = group_stop_times(stop_times);
        let trips_by_stop = index_trips_by_stop(&stop_times);

        let mut grouped_shapes: HashMap<ShapeIdentifier, Vec<ShapePoint>> = HashMap::new();
        for row in shapes {
            grouped_shapes.entry(row.shape_id).or_default().push(row.point);
        }
        for points in grouped_shapes.values_mut() {
            points.sort_by_key(|p| p.sequence);
        }

        let trips = trips
            .into_iter()
            .map(|t| (t.id.clone(), Arc::new(t)))
            .collect();

        let calendars = calendars
            .into_iter()
            .map(|c| (c.service_id.clone(), c))
            .collect();

        let index = Self {
            routes,
            stops,
            stop_times,
            shapes: grouped_shapes,
            trips,
            calendars,
            trips_by_stop,
            stop_tree,
            fetched_at,
        };

        debug!(
            routes = index.routes.len(),
            stops = index.stops.len(),
            trips = index.stop_times.len(),
            shapes = index.shapes.len(),
            "built schedule index"
        );
        index
    }

    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        let fetched_at = snapshot.fetched_at;
        Self::build(snapshot.into_tables(), Some(fetched_at))
    }

    pub fn to_snapshot(&self, fetched_at: DateTime<Utc>) -> CacheSnapshot {
        let mut routes: Vec<Route> = self.routes.values().map(|r| Route::clone(r)).collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut stops: Vec<Stop> = self.stops.values().map(|s| Stop::clone(s)).collect();
        stops.sort_by(|a, b| a.id.cmp(&b.id));

        let mut trips: Vec<Trip> = self.trips.values().map(|t| Trip::clone(t)).collect();
        trips.sort_by(|a, b| a.id.cmp(&b.id));

        let mut calendars: Vec<ServiceCalendar> = self.calendars.values().cloned().collect();
        calendars.sort_by(|a, b| a.service_id.cmp(&b.service_id));

        CacheSnapshot {
            routes,
            stops,
            stop_times: self
                .stop_times
                .iter()
                .map(|(id, rows)| (id.clone(), rows.clone()))
                .collect(),
            shapes: self
                .shapes
                .iter()
                .map(|(id, points)| (id.clone(), points.clone()))
                .collect(),
            trips,
            calendars,
            fetched_at,
        }
    }

    /// When the data behind this index was downloaded
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.stops.is_empty() && self.stop_times.is_empty()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    /// Trips with at least one stop time
    pub fn trip_count(&self) -> usize {
        self.stop_times.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    // ---- Lookups ----

    pub fn stop(&self, id: &str) -> Option<&Arc<Stop>> {
        self.stops.get(id)
    }

    pub fn stop_name(&self, id: &str) -> Option<&str> {
        self.stops.get(id).map(|s| s.name.as_str())
    }

    pub fn route(&self, id: &str) -> Option<&Arc<Route>> {
        self.routes.get(id)
    }

    pub fn trip(&self, id: &str) -> Option<&Arc<Trip>> {
        self.trips.get(id)
    }

    pub fn stops(&self) -> impl Iterator<Item = &Arc<Stop>> {
        self.stops.values()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }

    /// Every trip that has stop times
    pub fn trip_ids(&self) -> impl Iterator<Item = &TripIdentifier> {
        self.stop_times.keys()
    }

    /// Route serving a trip, when the feed includes the trips table
    pub fn route_for_trip(&self, trip_id: &str) -> Option<&Arc<Route>> {
        self.trips
            .get(trip_id)
            .and_then(|trip| self.routes.get(&trip.route_id))
    }

    /// Public train number of a trip: the trips table's short name when the
    /// feed carries one, otherwise derived from the identifier
    pub fn train_number(&self, trip_id: &str) -> String {
        self.trips
            .get(trip_id)
            .and_then(|trip| trip.short_name.as_deref())
            .map(normalize_train_number)
            .unwrap_or_else(|| extract_train_number(trip_id))
    }

    /// Whether a trip operates on `date`; `None` without calendar data
    pub fn trip_runs_on(&self, trip_id: &str, date: NaiveDate) -> Option<bool> {
        let trip = self.trips.get(trip_id)?;
        let calendar = self.calendars.get(&trip.service_id)?;
        Some(calendar.runs_on(date))
    }

    // ---- Trip detail ----

    /// Stop times of a trip in sequence order
    pub fn stop_times(&self, trip_id: &str) -> &[StopTime] {
        self.stop_times.get(trip_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Stop times of a trip with stop names attached.
    /// Stops missing from the stops table are named by their id.
    pub fn stop_times_for_trip(&self, trip_id: &str) -> Vec<StopTimeView> {
        self.stop_times(trip_id)
            .iter()
            .map(|stop_time| StopTimeView {
                stop_name: self
                    .stop_name(stop_time.stop_id.as_str())
                    .unwrap_or(stop_time.stop_id.as_str())
                    .to_string(),
                stop_time: stop_time.clone(),
            })
            .collect()
    }

    /// Every stop of a trip except its origin and final destination
    pub fn intermediate_stops(&self, trip_id: &str) -> Vec<StopTimeView> {
        let mut views = self.stop_times_for_trip(trip_id);
        if views.len() <= 2 {
            return Vec::new();
        }
        views.pop();
        views.remove(0);
        views
    }

    /// Trips calling at a stop, ordered by their departure there
    pub fn trips_for_stop(&self, stop_id: &str) -> &[TripIdentifier] {
        self.trips_by_stop.get(stop_id).map(Vec::as_slice).unwrap_or_default()
    }

    // ---- Geometry ----

    pub fn shape(&self, shape_id: &str) -> &[ShapePoint] {
        self.shapes.get(shape_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn shape_for_trip(&self, trip_id: &str) -> &[ShapePoint] {
        self.trips
            .get(trip_id)
            .and_then(|trip| trip.shape_id.as_ref())
            .map(|shape_id| self.shape(shape_id.as_str()))
            .unwrap_or_default()
    }

    /// Stops within `radius_m` meters, nearest first
    pub fn stops_near(&self, point: Point, radius_m: f64) -> Vec<Arc<Stop>> {
        stop_index::stops_within(&self.stop_tree, point, radius_m)
    }

    pub fn nearest_stops(&self, point: Point, n: usize) -> Vec<Arc<Stop>> {
        stop_index::nearest(&self.stop_tree, point, n)
    }
}

impl Default for ScheduleIndex {
    fn default() -> Self {
        Self::empty()
    }
}

/// Group rows per trip, sorted by sequence. A repeated sequence number keeps
/// the first row seen.
fn group_stop_times(rows: Vec<StopTime>) -> HashMap<TripIdentifier, Vec<StopTime>> {
    let mut grouped: HashMap<TripIdentifier, Vec<StopTime>> = HashMap::new();
    for row in rows {
        grouped.entry(row.trip_id.clone()).or_default().push(row);
    }

    let mut duplicates = 0;
    for rows in grouped.values_mut() {
        rows.sort_by_key(|r| r.stop_sequence);
        let before = rows.len();
        rows.dedup_by_key(|r| r.stop_sequence);
        duplicates += before - rows.len();
    }

    if duplicates > 0 {
        warn!(duplicates, "dropped stop times repeating a stop_sequence");
    }
    grouped
}

fn index_trips_by_stop(
    stop_times: &HashMap<TripIdentifier, Vec<StopTime>>,
) -> HashMap<StopIdentifier, Vec<TripIdentifier>> {
    let mut calls: HashMap<StopIdentifier, Vec<(u32, TripIdentifier)>> = HashMap::new();
    let mut seen: HashSet<(&StopIdentifier, &TripIdentifier)> = HashSet::new();

    for (trip_id, rows) in stop_times {
        for row in rows {
            if !seen.insert((&row.stop_id, trip_id)) {
                continue;
            }
            let departs = service_seconds(&row.departure_time)
                .or_else(|_| service_seconds(&row.arrival_time))
                .unwrap_or(u32::MAX);
            calls
                .entry(row.stop_id.clone())
                .or_default()
                .push((departs, trip_id.clone()));
        }
    }

    calls
        .into_iter()
        .map(|(stop_id, mut trips)| {
            trips.sort();
            (stop_id, trips.into_iter().map(|(_, trip)| trip).collect())
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_intermediate_stops_of_three_stop_trip() {
        let index = ScheduleIndex::build(corridor(), None);

        let intermediate = index.intermediate_stops("T1");
        assert_eq!(intermediate.len(), 1);
        assert_eq!(intermediate[0].stop_time.stop_id.as_str(), "B");
        assert_eq!(intermediate[0].stop_name, "Buffalo");
    }

    #[test]
    fn test_intermediate_stops_of_short_or_unknown_trip() {
        let index = ScheduleIndex::build(corridor(), None);

        assert!(index.intermediate_stops("T2").is_empty());
        assert!(index.intermediate_stops("nope").is_empty());
    }

    #[test]
    fn test_stop_times_sorted_and_enriched() {
        let index = ScheduleIndex::build(corridor(), None);

        let names: Vec<_> = index
            .stop_times_for_trip("T1")
            .into_iter()
            .map(|v| v.stop_name)
            .collect();
        assert_eq!(names, vec!["Albany", "Buffalo", "Chicago"]);
    }

    #[test]
    fn test_unknown_stop_named_by_id() {
        let mut tables = corridor();
        tables.stop_times.push(stop_time("T3", "ZZZ", "08:00:00", 1));
        let index = ScheduleIndex::build(tables, None);

        assert_eq!(index.stop_times_for_trip("T3")[0].stop_name, "ZZZ");
    }

    #[test]
    fn test_duplicate_sequence_keeps_first_row() {
        let mut tables = corridor();
        tables.stop_times.push(stop_time("T1", "X", "08:00:00", 2));
        let index = ScheduleIndex::build(tables, None);

        let stops: Vec<_> = index.stop_times("T1").iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(stops, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_trips_for_stop_deduplicated_and_ordered_by_departure() {
        let mut tables = corridor();
        // T1 loops back through A later in the day
        tables.stop_times.push(stop_time("T1", "A", "23:55:00", 4));
        let index = ScheduleIndex::build(tables, None);

        let trips: Vec<_> = index.trips_for_stop("A").iter().map(|t| t.as_str()).collect();
        assert_eq!(trips, vec!["T1", "T2"]);
        assert!(index.trips_for_stop("nope").is_empty());
    }

    #[test]
    fn test_train_number_prefers_trip_short_name() {
        let index = ScheduleIndex::build(corridor(), None);

        assert_eq!(index.train_number("T1"), "49");
        assert_eq!(index.train_number("2026-01-16_AMTK_543"), "543");
    }

    #[test]
    fn test_route_for_trip() {
        let index = ScheduleIndex::build(corridor(), None);

        assert_eq!(index.route_for_trip("T1").unwrap().display_name(), "Lake Shore Limited");
        assert!(index.route_for_trip("T2").is_none());
    }

    #[test]
    fn test_shapes_grouped_and_sorted() {
        let mut tables = corridor();
        for (seq, lat) in [(2, 42.0), (1, 41.0), (3, 43.0)] {
            tables.shapes.push(ShapeRow {
                shape_id: ShapeIdentifier::new("S1"),
                point: ShapePoint { lat, lon: -80.0, sequence: seq },
            });
        }
        let index = ScheduleIndex::build(tables, None);

        let lats: Vec<_> = index.shape("S1").iter().map(|p| p.lat).collect();
        assert_eq!(lats, vec![41.0, 42.0, 43.0]);
        assert!(index.shape("S2").is_empty());
    }

    #[test]
    fn test_snapshot_round_trip_preserves_contents() {
        let fetched_at = Utc::now();
        let index = ScheduleIndex::build(corridor(), Some(fetched_at));

        let snapshot = index.to_snapshot(fetched_at);
        let rebuilt = ScheduleIndex::from_snapshot(snapshot.clone());

        assert_eq!(rebuilt.fetched_at(), Some(fetched_at));
        assert_eq!(rebuilt.to_snapshot(fetched_at), snapshot);
    }

    #[test]
    fn test_stops_near() {
        let index = ScheduleIndex::build(corridor(), None);

        let near = index.stops_near(Point::new(-87.63, 41.87), 1_000.0);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].name, "Chicago");
    }
}
