//! Engine configuration.
//!
//! Every field has a default, so an empty document deserializes to a working
//! configuration pointed at the Amtrak static feed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::spatial::cluster::ClusterConfig;

pub const DEFAULT_STATIC_FEED_URL: &str = "https://content.amtrak.com/content/gtfs/GTFS.zip";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub static_feed_url: String,
    /// GTFS-Realtime endpoint; realtime queries return nothing without one
    pub realtime_feed_url: Option<String>,
    /// Age after which the static schedule is refreshed
    pub cache_max_age_days: u32,
    /// How long a decoded realtime snapshot is reused
    pub realtime_ttl_secs: u64,
    pub http_timeout_secs: u64,
    pub cluster: ClusterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            static_feed_url: DEFAULT_STATIC_FEED_URL.to_string(),
            realtime_feed_url: None,
            cache_max_age_days: 7,
            realtime_ttl_secs: 15,
            http_timeout_secs: 60,
            cluster: ClusterConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn realtime_ttl(&self) -> Duration {
        Duration::from_secs(self.realtime_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.realtime_ttl(), Duration::from_secs(15));
        assert_eq!(config.cache_max_age_days, 7);
    }

    #[test]
    fn test_partial_cluster_section() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"cluster": {"train_threshold": 3.5}}"#).unwrap();
        assert_eq!(config.cluster.train_threshold, 3.5);
        assert_eq!(config.cluster.station_threshold, 5.0);
        assert_eq!(config.static_feed_url, DEFAULT_STATIC_FEED_URL);
    }
}
