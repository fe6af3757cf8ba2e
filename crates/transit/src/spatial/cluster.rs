//! Zoom-dependent grouping of nearby map markers.
//!
//! Distances are Euclidean in degree space, which is coarse but adequate for
//! deciding whether two markers would overlap on screen.

use std::sync::Arc;

use geo::{Centroid, MultiPoint, Point};
use serde::{Deserialize, Serialize};

use crate::models::types::Stop;

/// Anything that can be placed on the map
pub trait Locatable {
    fn location(&self) -> Point;
}

impl Locatable for Point {
    fn location(&self) -> Point {
        *self
    }
}

impl Locatable for Stop {
    fn location(&self) -> Point {
        Stop::location(self)
    }
}

impl<T: Locatable + ?Sized> Locatable for Arc<T> {
    fn location(&self) -> Point {
        (**self).location()
    }
}

impl<T: Locatable + ?Sized> Locatable for &T {
    fn location(&self) -> Point {
        (**self).location()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cluster<'a, T> {
    /// A marker drawn on its own
    Single(&'a T),
    /// Two or more markers drawn as one at their centroid
    Group { centroid: Point, members: Vec<&'a T> },
}

impl<T: Locatable> Cluster<'_, T> {
    pub fn location(&self) -> Point {
        match self {
            Cluster::Single(item) => item.location(),
            Cluster::Group { centroid, .. } => *centroid,
        }
    }

    pub fn member_count(&self) -> usize {
        match self {
            Cluster::Single(_) => 1,
            Cluster::Group { members, .. } => members.len(),
        }
    }
}

/// Group `points` for a viewport `zoom_width_degrees` wide.
///
/// Below `threshold` every point stands alone. Otherwise a greedy pass in
/// input order lets each unclaimed point claim every other unclaimed point
/// within `zoom_width_degrees * radius_factor`. Quadratic in the number of
/// points, which the viewport keeps small.
pub fn cluster<T: Locatable>(
    points: &[T],
    zoom_width_degrees: f64,
    threshold: f64,
    radius_factor: f64,
) -> Vec<Cluster<'_, T>> {
    if zoom_width_degrees < threshold {
        return points.iter().map(Cluster::Single).collect();
    }

    let radius = zoom_width_degrees * radius_factor;
    let locations: Vec<Point> = points.iter().map(|p| p.location()).collect();
    let mut claimed = vec![false; points.len()];
    let mut clusters = Vec::new();

    for seed in 0..points.len() {
        if claimed[seed] {
            continue;
        }
        claimed[seed] = true;

        let mut members = vec![seed];
        for other in (seed + 1)..points.len() {
            if claimed[other] {
                continue;
            }
            let dx = locations[other].x() - locations[seed].x();
            let dy = locations[other].y() - locations[seed].y();
            if dx.hypot(dy) <= radius {
                claimed[other] = true;
                members.push(other);
            }
        }

        if members.len() == 1 {
            clusters.push(Cluster::Single(&points[seed]));
            continue;
        }

        let centroid = MultiPoint::from(members.iter().map(|&i| locations[i]).collect::<Vec<_>>())
            .centroid()
            .unwrap_or(locations[seed]);
        clusters.push(Cluster::Group {
            centroid,
            members: members.into_iter().map(|i| &points[i]).collect(),
        });
    }

    clusters
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Viewport width (degrees) from which stations start grouping
    pub station_threshold: f64,
    /// Viewport width (degrees) from which live trains start grouping
    pub train_threshold: f64,
    /// Grouping radius as a fraction of the viewport width
    pub radius_factor: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            station_threshold: 5.0,
            train_threshold: 2.0,
            radius_factor: 0.1,
        }
    }
}

/// Clustering with per-layer thresholds. Holds no state between calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterEngine {
    config: ClusterConfig,
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn cluster_stations<'a, T: Locatable>(
        &self,
        stations: &'a [T],
        zoom_width_degrees: f64,
    ) -> Vec<Cluster<'a, T>> {
        cluster(
            stations,
            zoom_width_degrees,
            self.config.station_threshold,
            self.config.radius_factor,
        )
    }

    pub fn cluster_trains<'a, T: Locatable>(
        &self,
        trains: &'a [T],
        zoom_width_degrees: f64,
    ) -> Vec<Cluster<'a, T>> {
        cluster(
            trains,
            zoom_width_degrees,
            self.config.train_threshold,
            self.config.radius_factor,
        )
    }
}
