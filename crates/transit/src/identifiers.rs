//! Newtype keys for stops, routes, trips, shapes and services.
//!
//! Each key wraps an `Arc<str>`, so cloning one into several indexes shares a
//! single allocation. Keys borrow as `str`, which lets a map keyed by
//! [`TripIdentifier`] be queried with a plain `&str`. On the wire they are bare
//! JSON strings.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! define_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(Arc::from(value.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        // Derived Hash on Arc<str> hashes the string contents, matching str.
        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(Arc::from(value))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.as_str().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Ok(String::deserialize(deserializer)?.into())
            }
        }
    };
}

define_identifier!(
    /// `stop_id` from stops.txt
    StopIdentifier
);
define_identifier!(
    /// `route_id` from routes.txt
    RouteIdentifier
);
define_identifier!(
    /// `trip_id`, shared by trips.txt, stop_times.txt and realtime trip descriptors
    TripIdentifier
);
define_identifier!(ShapeIdentifier);
define_identifier!(ServiceIdentifier);
