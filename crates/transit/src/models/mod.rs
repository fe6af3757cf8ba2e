//! Schedule records shared by the feed parser, the index and the cache.

pub mod calendar;
pub mod types;

pub use calendar::{OperatingDays, ServiceCalendar, WeeklyPattern};
pub use types::{
    DirectionId, Result, Route, RouteType, ShapePoint, ShapeRow, Stop, StopTime, StopTimeView,
    TransitError, Trip,
};
