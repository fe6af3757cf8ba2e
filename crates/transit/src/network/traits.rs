//! Pluggable networking and persistence traits.
//!
//! The engine never talks to the network or disk directly; callers hand it
//! implementations of these.

use std::future::Future;
use std::pin::Pin;

use crate::models::types::Result;

/// Fetch raw bytes from a URL.
///
/// Non-success responses and timeouts must surface as
/// [`TransitError::Network`](crate::models::types::TransitError::Network).
pub trait DataFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;
}

/// String key-value persistence for the schedule snapshot
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` when the key was never written
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
