//! Static schedule: indexed feed data, its persisted snapshot and the service
//! that keeps both current.

pub mod cache;
pub mod index;
pub mod search;
pub mod service;

pub use cache::CacheSnapshot;
pub use index::ScheduleIndex;
pub use search::{SearchKind, SearchResult, MAX_RESULTS};
pub use service::{
    Freshness, RefreshFailure, RefreshOutcome, RefreshPhase, RefreshProgress, RefreshSummary,
    ScheduleService,
};
