//! Decoded realtime state for one poll of the feed.
//!
//! Every record is reachable under its full trip identifier and, when it
//! differs, under the public train number. Exact trip identifiers win over
//! train-number aliases; among aliases the most recent observation wins.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo::Point;
use prost::Message;
use serde::Serialize;
use tracing::debug;

use crate::identifiers::{StopIdentifier, TripIdentifier};
use crate::models::types::Result;
use crate::realtime::proto;
use crate::realtime::proto::trip_update::stop_time_update;
use crate::realtime::reconcile::extract_train_number;
use crate::schedule::index::ScheduleIndex;
use crate::spatial::cluster::Locatable;

/// How a stop-level update relates to the static schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ScheduleRelationship {
    Scheduled,
    Skipped,
    NoData,
    Unscheduled,
}

impl From<stop_time_update::ScheduleRelationship> for ScheduleRelationship {
    fn from(value: stop_time_update::ScheduleRelationship) -> Self {
        match value {
            stop_time_update::ScheduleRelationship::Scheduled => Self::Scheduled,
            stop_time_update::ScheduleRelationship::Skipped => Self::Skipped,
            stop_time_update::ScheduleRelationship::NoData => Self::NoData,
            stop_time_update::ScheduleRelationship::Unscheduled => Self::Unscheduled,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RealtimePosition {
    pub trip_id: TripIdentifier,
    pub train_number: String,
    pub lat: f64,
    pub lon: f64,
    pub bearing: Option<f32>,
    /// Meters per second
    pub speed: Option<f32>,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub vehicle_id: Option<String>,
    pub current_stop_id: Option<StopIdentifier>,
}

impl Locatable for RealtimePosition {
    fn location(&self) -> Point {
        Point::new(self.lon, self.lat)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RealtimeDelay {
    pub trip_id: TripIdentifier,
    pub stop_id: Option<StopIdentifier>,
    pub stop_sequence: Option<u32>,
    pub arrival_delay_secs: Option<i32>,
    pub departure_delay_secs: Option<i32>,
    pub relationship: ScheduleRelationship,
}

impl RealtimeDelay {
    /// Arrival delay, else departure delay, in seconds
    pub fn delay_secs(&self) -> Option<i32> {
        self.arrival_delay_secs.or(self.departure_delay_secs)
    }

    /// Delay in whole minutes; nothing for skipped stops or stops without data
    pub fn delay_minutes(&self) -> Option<i32> {
        match self.relationship {
            ScheduleRelationship::Skipped | ScheduleRelationship::NoData => None,
            _ => self.delay_secs().map(seconds_to_minutes),
        }
    }

    fn applies_to(&self, stop_id: &StopIdentifier, stop_sequence: u32) -> bool {
        match self.stop_sequence {
            Some(sequence) => sequence == stop_sequence,
            None => self.stop_id.as_ref() == Some(stop_id),
        }
    }
}

/// Stop-level updates of one trip, in feed order
#[derive(Clone, Debug, PartialEq)]
pub struct TripDelays {
    pub trip_id: TripIdentifier,
    pub train_number: String,
    /// Delay the producer reported for the trip as a whole
    pub trip_delay_secs: Option<i32>,
    pub updated_ms: i64,
    pub stops: Vec<RealtimeDelay>,
}

/// A train currently reporting a position
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActiveTrain {
    pub train_number: String,
    pub position: RealtimePosition,
    pub delay_minutes: Option<i32>,
}

impl Locatable for ActiveTrain {
    fn location(&self) -> Point {
        self.position.location()
    }
}

/// Feed seconds as epoch milliseconds; `None` when out of range
fn seconds_to_ms(seconds: u64) -> Option<i64> {
    i64::try_from(seconds).ok()?.checked_mul(1000)
}

fn seconds_to_minutes(seconds: i32) -> i32 {
    (f64::from(seconds) / 60.0).round() as i32
}

/// Rider-facing delay text
pub fn format_delay(minutes: Option<i32>) -> String {
    match minutes {
        None | Some(0) => "On Time".to_string(),
        Some(m) if m > 0 => format!("Delayed {m}m"),
        Some(m) => format!("Early {}m", m.unsigned_abs()),
    }
}

/// Records reachable by trip id and train number
trait Observation {
    fn trip_id(&self) -> &str;
    fn train_number(&self) -> &str;
    fn observed_ms(&self) -> i64;
}

impl Observation for RealtimePosition {
    fn trip_id(&self) -> &str {
        self.trip_id.as_str()
    }
    fn train_number(&self) -> &str {
        &self.train_number
    }
    fn observed_ms(&self) -> i64 {
        self.timestamp_ms
    }
}

impl Observation for TripDelays {
    fn trip_id(&self) -> &str {
        self.trip_id.as_str()
    }
    fn train_number(&self) -> &str {
        &self.train_number
    }
    fn observed_ms(&self) -> i64 {
        self.updated_ms
    }
}

fn key_records<T: Observation>(records: &[Arc<T>]) -> HashMap<String, Arc<T>> {
    let mut by_age: Vec<&Arc<T>> = records.iter().collect();
    by_age.sort_by_key(|r| r.observed_ms());

    let mut keyed = HashMap::with_capacity(records.len() * 2);
    for record in by_age {
        if !record.train_number().is_empty() && record.train_number() != record.trip_id() {
            keyed.insert(record.train_number().to_string(), Arc::clone(record));
        }
    }
    for record in records {
        keyed.insert(record.trip_id().to_string(), Arc::clone(record));
    }
    keyed
}

#[derive(Clone, Debug, Default)]
pub struct RealtimeSnapshot {
    positions: HashMap<String, Arc<RealtimePosition>>,
    delays: HashMap<String, Arc<TripDelays>>,
    trains: Vec<Arc<RealtimePosition>>,
    trip_updates: usize,
    fetched_at: Option<DateTime<Utc>>,
}

impl RealtimeSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode one feed message.
    ///
    /// With a schedule at hand, train numbers come from the static trips
    /// table where it knows the trip; otherwise they are derived from the
    /// trip identifier.
    pub fn decode(
        bytes: &[u8],
        schedule: Option<&ScheduleIndex>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let message = proto::FeedMessage::decode(bytes)?;
        Ok(Self::from_message(&message, schedule, now))
    }

    pub fn from_message(
        message: &proto::FeedMessage,
        schedule: Option<&ScheduleIndex>,
        now: DateTime<Utc>,
    ) -> Self {
        let train_number = |trip_id: &str| match schedule {
            Some(index) => index.train_number(trip_id),
            None => extract_train_number(trip_id),
        };
        let header_ms = message.header.timestamp.and_then(seconds_to_ms);
        let now_ms = now.timestamp_millis();

        let mut positions = Vec::new();
        let mut trip_delays = Vec::new();
        let mut skipped = 0;

        for entity in &message.entity {
            if entity.is_deleted == Some(true) {
                continue;
            }

            if let Some(vehicle) = &entity.vehicle {
                let trip_id = vehicle.trip.as_ref().and_then(|t| t.trip_id.as_deref());
                match (trip_id, vehicle.position) {
                    (Some(trip_id), Some(position)) if !trip_id.is_empty() => {
                        positions.push(Arc::new(RealtimePosition {
                            trip_id: TripIdentifier::new(trip_id),
                            train_number: train_number(trip_id),
                            lat: f64::from(position.latitude),
                            lon: f64::from(position.longitude),
                            bearing: position.bearing,
                            speed: position.speed,
                            timestamp_ms: vehicle
                                .timestamp
                                .and_then(seconds_to_ms)
                                .or(header_ms)
                                .unwrap_or(now_ms),
                            vehicle_id: vehicle.vehicle.as_ref().and_then(|v| v.id.clone()),
                            current_stop_id: vehicle.stop_id.as_deref().map(StopIdentifier::new),
                        }));
                    }
                    _ => skipped += 1,
                }
            }

            if let Some(update) = &entity.trip_update {
                let trip_id = update.trip.trip_id.as_deref().filter(|id| !id.is_empty());
                let Some(trip_id) = trip_id else {
                    skipped += 1;
                    continue;
                };
                let trip = TripIdentifier::new(trip_id);
                let stops = update
                    .stop_time_update
                    .iter()
                    .map(|stu| RealtimeDelay {
                        trip_id: trip.clone(),
                        stop_id: stu.stop_id.as_deref().map(StopIdentifier::new),
                        stop_sequence: stu.stop_sequence,
                        arrival_delay_secs: stu.arrival.and_then(|e| e.delay),
                        departure_delay_secs: stu.departure.and_then(|e| e.delay),
                        relationship: stu.schedule_relationship().into(),
                    })
                    .collect();
                trip_delays.push(Arc::new(TripDelays {
                    train_number: train_number(trip_id),
                    trip_id: trip,
                    trip_delay_secs: update.delay,
                    updated_ms: update
                        .timestamp
                        .and_then(seconds_to_ms)
                        .or(header_ms)
                        .unwrap_or(now_ms),
                    stops,
                }));
            }
        }

        debug!(
            positions = positions.len(),
            trip_updates = trip_delays.len(),
            skipped,
            "decoded realtime feed"
        );

        Self {
            positions: key_records(&positions),
            delays: key_records(&trip_delays),
            trip_updates: trip_delays.len(),
            trains: positions,
            fetched_at: Some(now),
        }
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Number of distinct vehicle positions
    pub fn position_count(&self) -> usize {
        self.trains.len()
    }

    pub fn trip_update_count(&self) -> usize {
        self.trip_updates
    }

    fn lookup<'a, T>(map: &'a HashMap<String, Arc<T>>, key: &str) -> Option<&'a Arc<T>> {
        let key = key.trim();
        map.get(key)
            .or_else(|| map.get(extract_train_number(key).as_str()))
    }

    pub fn position_for_trip(&self, key: &str) -> Option<&RealtimePosition> {
        Self::lookup(&self.positions, key).map(Arc::as_ref)
    }

    pub fn trip_delays(&self, key: &str) -> Option<&TripDelays> {
        Self::lookup(&self.delays, key).map(Arc::as_ref)
    }

    /// Stop-level updates for a trip, in feed order
    pub fn delays_for_trip(&self, key: &str) -> &[RealtimeDelay] {
        self.trip_delays(key).map(|t| t.stops.as_slice()).unwrap_or_default()
    }

    /// Reported delay at one stop, in minutes
    pub fn delay_for_stop(&self, key: &str, stop_id: &str) -> Option<i32> {
        self.delays_for_trip(key)
            .iter()
            .find(|d| d.stop_id.as_ref().is_some_and(|id| id.as_str() == stop_id))
            .and_then(RealtimeDelay::delay_minutes)
    }

    /// Delay expected at a stop, carrying the latest reported delay forward
    /// along the trip's static stop order.
    ///
    /// Without static stop times for the trip this is [`Self::delay_for_stop`].
    pub fn propagated_delay(
        &self,
        key: &str,
        stop_id: &str,
        schedule: &ScheduleIndex,
    ) -> Option<i32> {
        let trip = self.trip_delays(key)?;
        let order = schedule.stop_times(trip.trip_id.as_str());
        let Some(target) = order.iter().position(|st| st.stop_id.as_str() == stop_id) else {
            return self.delay_for_stop(key, stop_id);
        };

        let mut current = trip.trip_delay_secs;
        for (i, stop_time) in order[..=target].iter().enumerate() {
            let update = trip
                .stops
                .iter()
                .find(|d| d.applies_to(&stop_time.stop_id, stop_time.stop_sequence));
            let Some(update) = update else {
                continue;
            };
            match update.relationship {
                ScheduleRelationship::NoData => current = None,
                ScheduleRelationship::Skipped if i == target => return None,
                ScheduleRelationship::Skipped => {}
                _ => {
                    if let Some(secs) = update.delay_secs() {
                        current = Some(secs);
                    }
                }
            }
        }
        current.map(seconds_to_minutes)
    }

    /// One entry per train number with a position, newest position winning,
    /// sorted by train number
    pub fn all_active_trains(&self) -> Vec<ActiveTrain> {
        let mut latest: HashMap<&str, &Arc<RealtimePosition>> = HashMap::new();
        for position in &self.trains {
            latest
                .entry(position.train_number.as_str())
                .and_modify(|current| {
                    if position.timestamp_ms > current.timestamp_ms {
                        *current = position;
                    }
                })
                .or_insert(position);
        }

        let mut trains: Vec<ActiveTrain> = latest
            .into_values()
            .map(|position| ActiveTrain {
                train_number: position.train_number.clone(),
                delay_minutes: self.current_delay(position),
                position: RealtimePosition::clone(position),
            })
            .collect();

        trains.sort_by(|a, b| {
            train_sort_key(&a.train_number).cmp(&train_sort_key(&b.train_number))
        });
        trains
    }

    /// Delay at the stop a vehicle is at or approaching, else the first
    /// stop-level delay reported, else the trip-level delay
    fn current_delay(&self, position: &RealtimePosition) -> Option<i32> {
        let trip = self.delays.get(position.trip_id.as_str())?;

        let at_current = position.current_stop_id.as_ref().and_then(|stop_id| {
            trip.stops
                .iter()
                .find(|d| d.stop_id.as_ref() == Some(stop_id))
                .and_then(RealtimeDelay::delay_minutes)
        });

        at_current
            .or_else(|| trip.stops.iter().find_map(RealtimeDelay::delay_minutes))
            .or_else(|| trip.trip_delay_secs.map(seconds_to_minutes))
    }
}

/// Numeric train numbers first in numeric order, then everything else
fn train_sort_key(number: &str) -> (bool, u64, &str) {
    match number.parse::<u64>() {
        Ok(n) => (false, n, number),
        Err(_) => (true, 0, number),
    }
}


#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::proto::trip_update::stop_time_update::ScheduleRelationship as Rel;
    use super::test_feed::*;
    use super::*;
    use crate::schedule::index::fixtures;

    const COMPOSITE: &str = "2026-01-16_AMTK_543";

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_768_550_400, 0).unwrap()
    }

    fn decode(message: proto::FeedMessage, schedule: Option<&ScheduleIndex>) -> RealtimeSnapshot {
        RealtimeSnapshot::decode(&message.encode_to_vec(), schedule, now()).unwrap()
    }

    #[test]
    fn test_composite_id_and_train_number_resolve_same_position() {
        let snapshot = decode(message(None, vec![vehicle(COMPOSITE, 41.87, -87.63, None)]), None);

        let by_id = snapshot.position_for_trip(COMPOSITE).unwrap();
        let by_number = snapshot.position_for_trip("543").unwrap();
        assert_eq!(by_id, by_number);
        assert_eq!(by_id.train_number, "543");
        assert_relative_eq!(by_id.lat, 41.87, epsilon = 1e-4);
        assert_eq!(by_id.vehicle_id.as_deref(), Some("loco-2026-01-16_AMTK_543"));
        assert_eq!(snapshot.position_count(), 1);
    }

    #[test]
    fn test_lookup_normalizes_query() {
        let snapshot = decode(message(None, vec![vehicle(COMPOSITE, 41.87, -87.63, None)]), None);

        assert!(snapshot.position_for_trip("AMTK 0543").is_some());
        assert!(snapshot.position_for_trip("544").is_none());
    }

    #[test]
    fn test_static_short_name_names_the_train() {
        let schedule = ScheduleIndex::build(fixtures::corridor(), None);
        let snapshot = decode(
            message(None, vec![vehicle("T1", 42.0, -80.0, None)]),
            Some(&schedule),
        );

        assert_eq!(snapshot.position_for_trip("49").unwrap().trip_id.as_str(), "T1");
    }

    #[test]
    fn test_position_timestamp_fallbacks() {
        let snapshot = decode(
            message(
                Some(1_700_000_000),
                vec![
                    vehicle("1_1", 40.0, -75.0, Some(1_700_000_100)),
                    vehicle("1_2", 40.0, -75.0, None),
                ],
            ),
            None,
        );
        assert_eq!(snapshot.position_for_trip("1").unwrap().timestamp_ms, 1_700_000_100_000);
        assert_eq!(snapshot.position_for_trip("2").unwrap().timestamp_ms, 1_700_000_000_000);

        let headerless = decode(message(None, vec![vehicle("1_3", 40.0, -75.0, None)]), None);
        assert_eq!(
            headerless.position_for_trip("3").unwrap().timestamp_ms,
            now().timestamp_millis()
        );
    }

    #[test]
    fn test_out_of_range_timestamps_fall_back() {
        let mut late_update = trip_update("1_5", Vec::new());
        late_update.trip_update.as_mut().unwrap().timestamp = Some(u64::MAX);

        let snapshot = decode(
            message(
                Some(1_700_000_000),
                vec![
                    vehicle("1_4", 40.0, -75.0, Some(1u64 << 60)),
                    vehicle("1_6", 40.0, -75.0, Some(u64::MAX)),
                    late_update,
                ],
            ),
            None,
        );
        assert_eq!(snapshot.position_for_trip("4").unwrap().timestamp_ms, 1_700_000_000_000);
        assert_eq!(snapshot.position_for_trip("6").unwrap().timestamp_ms, 1_700_000_000_000);
        assert_eq!(snapshot.trip_delays("5").unwrap().updated_ms, 1_700_000_000_000);

        let header_overflow = decode(
            message(Some(1u64 << 60), vec![vehicle("1_7", 40.0, -75.0, None)]),
            None,
        );
        assert_eq!(
            header_overflow.position_for_trip("7").unwrap().timestamp_ms,
            now().timestamp_millis()
        );
    }

    #[test]
    fn test_entities_without_trip_id_are_skipped() {
        let mut anonymous = vehicle("x", 40.0, -75.0, None);
        anonymous.vehicle.as_mut().unwrap().trip = None;
        let snapshot = decode(message(None, vec![anonymous]), None);

        assert_eq!(snapshot.position_count(), 0);
        assert!(snapshot.all_active_trains().is_empty());
    }

    #[test]
    fn test_delay_for_stop_rounds_to_minutes() {
        let snapshot = decode(
            message(
                None,
                vec![trip_update(
                    COMPOSITE,
                    vec![
                        stop_update("NYP", 1, Some(90), Rel::Scheduled),
                        stop_update("PHL", 2, Some(-29), Rel::Scheduled),
                        stop_update("WIL", 3, Some(600), Rel::Skipped),
                        stop_update("BAL", 4, None, Rel::NoData),
                    ],
                )],
            ),
            None,
        );

        assert_eq!(snapshot.delay_for_stop("543", "NYP"), Some(2));
        assert_eq!(snapshot.delay_for_stop(COMPOSITE, "PHL"), Some(0));
        assert_eq!(snapshot.delay_for_stop("543", "WIL"), None);
        assert_eq!(snapshot.delay_for_stop("543", "BAL"), None);
        assert_eq!(snapshot.delay_for_stop("543", "WAS"), None);
        assert_eq!(snapshot.delays_for_trip("543").len(), 4);
    }

    #[test]
    fn test_propagated_delay_follows_stop_order() {
        let schedule = ScheduleIndex::build(fixtures::corridor(), None);
        let snapshot = decode(
            message(
                None,
                vec![trip_update(
                    "T1",
                    vec![stop_update("A", 1, Some(300), Rel::Scheduled)],
                )],
            ),
            Some(&schedule),
        );

        assert_eq!(snapshot.delay_for_stop("T1", "C"), None);
        assert_eq!(snapshot.propagated_delay("T1", "C", &schedule), Some(5));
        assert_eq!(snapshot.propagated_delay("49", "B", &schedule), Some(5));
    }

    #[test]
    fn test_propagation_stops_at_no_data() {
        let schedule = ScheduleIndex::build(fixtures::corridor(), None);
        let snapshot = decode(
            message(
                None,
                vec![trip_update(
                    "T1",
                    vec![
                        stop_update("A", 1, Some(300), Rel::Scheduled),
                        stop_update("B", 2, None, Rel::NoData),
                    ],
                )],
            ),
            Some(&schedule),
        );

        assert_eq!(snapshot.propagated_delay("T1", "A", &schedule), Some(5));
        assert_eq!(snapshot.propagated_delay("T1", "C", &schedule), None);
    }

    #[test]
    fn test_all_active_trains_distinct_and_sorted() {
        let snapshot = decode(
            message(
                None,
                vec![
                    vehicle("2026-01-16_AMTK_91", 30.0, -81.0, Some(100)),
                    vehicle("2026-01-15_AMTK_91", 31.0, -81.0, Some(200)),
                    vehicle("2026-01-16_AMTK_7", 45.0, -122.0, Some(100)),
                    vehicle("2026-01-16_AMTK_20", 40.0, -75.0, Some(100)),
                    trip_update(
                        "2026-01-16_AMTK_20",
                        vec![stop_update("NYP", 1, Some(240), Rel::Scheduled)],
                    ),
                ],
            ),
            None,
        );

        let trains = snapshot.all_active_trains();
        let numbers: Vec<_> = trains.iter().map(|t| t.train_number.as_str()).collect();
        assert_eq!(numbers, vec!["7", "20", "91"]);
        assert_eq!(trains[2].position.trip_id.as_str(), "2026-01-15_AMTK_91");
        assert_eq!(trains[1].delay_minutes, Some(4));
        assert_eq!(trains[0].delay_minutes, None);

        // the alias follows the newest report as well
        assert_eq!(
            snapshot.position_for_trip("91").unwrap().trip_id.as_str(),
            "2026-01-15_AMTK_91"
        );
    }

    #[test]
    fn test_malformed_bytes_are_a_decode_error() {
        let result = RealtimeSnapshot::decode(&[0xff, 0xff, 0xff], None, now());
        assert!(matches!(result, Err(crate::models::types::TransitError::Decode(_))));
    }

    #[test]
    fn test_format_delay() {
        assert_eq!(format_delay(None), "On Time");
        assert_eq!(format_delay(Some(0)), "On Time");
        assert_eq!(format_delay(Some(12)), "Delayed 12m");
        assert_eq!(format_delay(Some(-3)), "Early 3m");
    }
}
