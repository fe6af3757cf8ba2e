//! Spatial indexing, distance queries and marker clustering.

pub mod cluster;
pub mod index;
pub mod queries;

pub use cluster::{cluster, Cluster, ClusterConfig, ClusterEngine, Locatable};
pub use queries::haversine_distance;
