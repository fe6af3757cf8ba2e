//! Live positions and delays from a GTFS-Realtime feed, reconciled with the
//! static schedule.

pub mod overlay;
pub mod proto;
pub mod reconcile;
pub mod service;

pub use overlay::{
    format_delay, ActiveTrain, RealtimeDelay, RealtimePosition, RealtimeSnapshot,
    ScheduleRelationship, TripDelays,
};
pub use reconcile::{extract_train_number, match_train_number, normalize_train_number};
pub use service::RealtimeService;
