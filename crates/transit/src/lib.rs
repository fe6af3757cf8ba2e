//! # railwatch-transit
//!
//! Offline-first rail schedule engine with a live overlay.
//!
//! ## What it covers
//!
//! - **Static schedule**: GTFS zip archives parsed into an immutable, indexed
//!   [`ScheduleIndex`](schedule::ScheduleIndex) and persisted as a snapshot so
//!   the next start needs no network
//! - **Realtime overlay**: GTFS-Realtime positions and delays, reachable by
//!   trip id or public train number
//! - **Spatial queries**: R-tree backed nearby-stop lookups
//! - **Clustering**: zoom-dependent grouping of stations and trains
//! - **Pluggable networking**: implement [`DataFetcher`] and [`KeyValueStore`]
//!   for your platform
//!
//! ## Quick look
//!
//! ```
//! use railwatch_transit::prelude::*;
//! use geo::Point;
//!
//! let tables = FeedTables {
//!     stops: vec![Stop {
//!         id: StopIdentifier::new("CHI"),
//!         name: "Chicago Union Station".into(),
//!         lat: 41.8787,
//!         lon: -87.6403,
//!         timezone: None,
//!         parent_station: None,
//!     }],
//!     ..Default::default()
//! };
//! let index = ScheduleIndex::build(tables, None);
//!
//! // Stops within 2km of the Loop
//! let nearby = index.stops_near(Point::new(-87.6298, 41.8781), 2_000.0);
//! assert_eq!(nearby.len(), 1);
//!
//! // Free-text search is case-insensitive
//! assert_eq!(index.search("union").len(), 1);
//! ```

pub mod config;
pub mod feed;
pub mod identifiers;
pub mod models;
pub mod network;
pub mod realtime;
pub mod schedule;
pub mod spatial;
pub mod time;

/// Everything a front end needs to load a schedule and query it
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::feed::FeedTables;
    pub use crate::identifiers::*;
    pub use crate::models::{calendar::*, types::*};
    pub use crate::network::traits::*;
    pub use crate::realtime::{
        format_delay, ActiveTrain, RealtimeDelay, RealtimePosition, RealtimeService,
        RealtimeSnapshot,
    };
    pub use crate::schedule::{
        Freshness, RefreshFailure, RefreshOutcome, RefreshPhase, RefreshProgress, RefreshSummary,
        ScheduleIndex, ScheduleService, SearchResult,
    };
    pub use crate::spatial::{Cluster, ClusterConfig, ClusterEngine, Locatable};
    pub use crate::time::{format_with_day_offset, DayOffsetTime};
}

pub use prelude::*;
