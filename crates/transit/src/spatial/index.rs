//! R-tree nodes for spatial indexing.
//!
//! ## Two-Stage Filtering
//!
//! Stop lookups use a two-stage filter:
//! 1. **R-tree filter**: Euclidean distance in degree space for a fast
//!    candidate set, with the radius widened for the query latitude
//! 2. **Haversine filter**: accurate geodesic distance on the candidates

use std::sync::Arc;

use geo::Point;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::models::types::Stop;
use crate::spatial::queries::{haversine_distance, search_radius_degrees};

#[derive(Clone, Debug)]
pub struct StopNode {
    pub stop: Arc<Stop>,
    point: [f64; 2],
}

impl StopNode {
    pub fn new(stop: Arc<Stop>) -> Self {
        let location = stop.location();
        Self {
            stop,
            point: [location.x(), location.y()],
        }
    }
}

impl RTreeObject for StopNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for StopNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Stops within `radius_m` meters of `point`, nearest first
pub fn stops_within(tree: &RTree<StopNode>, point: Point, radius_m: f64) -> Vec<Arc<Stop>> {
    if radius_m <= 0.0 || !radius_m.is_finite() {
        return Vec::new();
    }

    let degrees = search_radius_degrees(radius_m, point.y());
    let mut found: Vec<(f64, Arc<Stop>)> = tree
        .locate_within_distance([point.x(), point.y()], degrees * degrees)
        .map(|node| (haversine_distance(point, node.stop.location()), node.stop.clone()))
        .filter(|(distance, _)| *distance <= radius_m)
        .collect();

    found.sort_by(|a, b| a.0.total_cmp(&b.0));
    found.into_iter().map(|(_, stop)| stop).collect()
}

/// The `n` stops closest to `point` in degree space
pub fn nearest(tree: &RTree<StopNode>, point: Point, n: usize) -> Vec<Arc<Stop>> {
    tree.nearest_neighbor_iter(&[point.x(), point.y()])
        .take(n)
        .map(|node| node.stop.clone())
        .collect()
}
