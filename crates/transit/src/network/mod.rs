//! Network and IO abstractions.

#[cfg(feature = "http")]
pub mod http;
pub mod store;
pub mod traits;

#[cfg(feature = "http")]
pub use http::HttpFetcher;
pub use store::{DirectoryStore, MemoryStore};
pub use traits::{DataFetcher, KeyValueStore};
