//! Great-circle distances and the degree radii used to pre-filter R-tree
//! envelope queries.

use geo::{HaversineDistance, Point};

const METERS_PER_DEGREE: f64 = 111_320.0; // at the equator

/// Metres between two lon/lat points
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    p1.haversine_distance(&p2)
}

/// Metres as degrees of latitude
pub fn meters_to_degrees_approx(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Degree radius that covers `meters` in every direction around `latitude`.
///
/// Longitude degrees shrink towards the poles, so the equator conversion is
/// widened by the latitude's cosine. Clamped to stay finite near the poles.
pub fn search_radius_degrees(meters: f64, latitude: f64) -> f64 {
    let cos = latitude.to_radians().cos().abs().max(0.01);
    meters_to_degrees_approx(meters) / cos
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_chicago_to_new_york() {
        // Union Station to Penn Station, roughly 1,150 km
        let chicago = Point::new(-87.6394, 41.8787);
        let new_york = Point::new(-73.9935, 40.7505);

        let dist = haversine_distance(chicago, new_york);
        assert!((dist - 1_150_000.0).abs() < 20_000.0);
    }

    #[test]
    fn test_search_radius_widens_with_latitude() {
        let equator = search_radius_degrees(1_000.0, 0.0);
        let north = search_radius_degrees(1_000.0, 60.0);

        assert_relative_eq!(equator, 1_000.0 / 111_320.0);
        assert_relative_eq!(north, equator * 2.0, epsilon = 1e-9);
    }
}
