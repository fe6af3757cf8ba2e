//! Records parsed from the static feed, plus the crate error type.

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::identifiers::*;

/// `route_type` from routes.txt, basic values plus the extended ranges
/// (100-series rail, 400-series urban rail, 700-series bus) folded in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableTram,
    AerialLift,
    Funicular,
    Trolleybus,
    Monorail,
}

impl RouteType {
    pub fn from_gtfs(code: u16) -> Option<Self> {
        let kind = match code {
            0 | 900..=999 => Self::Tram,
            1 | 400..=499 => Self::Subway,
            2 | 100..=199 => Self::Rail,
            3 | 200..=299 | 700..=799 => Self::Bus,
            4 | 1000..=1099 | 1200 => Self::Ferry,
            5 => Self::CableTram,
            6 | 1300..=1399 => Self::AerialLift,
            7 | 1400 => Self::Funicular,
            11 | 800 => Self::Trolleybus,
            12 => Self::Monorail,
            _ => return None,
        };
        Some(kind)
    }

    /// Heavy or intercity rail, the services train numbers apply to
    pub fn is_rail(self) -> bool {
        matches!(self, Self::Rail)
    }
}

/// `direction_id`, 0 or 1 with agency-defined meaning
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectionId {
    Outbound,
    Inbound,
}

impl DirectionId {
    pub fn from_gtfs(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Outbound),
            1 => Some(Self::Inbound),
            _ => None,
        }
    }
}

/// A row of `routes.txt`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteIdentifier,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    /// Hex RGB without the leading `#`, e.g. `"1F4E8C"`
    pub color: Option<String>,
    pub text_color: Option<String>,
    pub route_type: Option<RouteType>,
}

impl Route {
    /// Best name for display: long name, then short name, then the id
    pub fn display_name(&self) -> &str {
        self.long_name
            .as_deref()
            .or(self.short_name.as_deref())
            .unwrap_or(self.id.as_str())
    }
}

/// A row of `stops.txt`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopIdentifier,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub timezone: Option<String>,
    pub parent_station: Option<StopIdentifier>,
}

impl Stop {
    /// Location as a `geo` point (x = longitude, y = latitude)
    pub fn location(&self) -> Point {
        Point::new(self.lon, self.lat)
    }
}

/// A single scheduled call of a trip at a stop.
///
/// Arrival and departure stay in the feed's raw clock form. Hours may exceed
/// 23 for calls after midnight of the service day (e.g. `25:30:00`), see
/// [`crate::time::format_with_day_offset`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTime {
    pub trip_id: TripIdentifier,
    pub stop_id: StopIdentifier,
    pub arrival_time: String,
    pub departure_time: String,
    pub stop_sequence: u32,
}

/// A stop time enriched with the display name of its stop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopTimeView {
    pub stop_time: StopTime,
    pub stop_name: String,
}

/// One vertex of a shape polyline
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapePoint {
    pub lat: f64,
    pub lon: f64,
    pub sequence: u32,
}

/// A shape row before grouping
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeRow {
    pub shape_id: ShapeIdentifier,
    pub point: ShapePoint,
}

/// A row of `trips.txt`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripIdentifier,
    pub route_id: RouteIdentifier,
    pub service_id: ServiceIdentifier,
    pub headsign: Option<String>,
    /// Public train number, when the feed carries one
    pub short_name: Option<String>,
    pub shape_id: Option<ShapeIdentifier>,
    pub direction: Option<DirectionId>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("required table missing from feed: {0}.txt")]
    MissingTable(String),

    #[error("cached snapshot unreadable: {0}")]
    CacheCorrupt(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid time: {0:?}")]
    InvalidTime(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for TransitError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<zip::result::ZipError> for TransitError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Decode(format!("feed archive: {err}"))
    }
}

impl From<csv::Error> for TransitError {
    fn from(err: csv::Error) -> Self {
        Self::Decode(format!("csv: {err}"))
    }
}

impl From<prost::DecodeError> for TransitError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Decode(format!("realtime feed: {err}"))
    }
}

impl From<std::io::Error> for TransitError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransitError>;
