//! Great-circle distance and heading helpers.
//!
//! All inputs are WGS84 degrees. Distances come back in meters; callers that
//! think in kilometers divide by 1000 at the call site so the unit never drifts.

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine great-circle distance between two points, in meters.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Planar heading from the first point to the second, in degrees `[0, 360)`.
///
/// This treats the lat/lon deltas as a flat grid, which is good enough between
/// consecutive one-second samples. Identical points return 0.
pub fn heading_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;
    if d_lat == 0.0 && d_lon == 0.0 {
        return 0.0;
    }

    let heading = d_lon.atan2(d_lat).to_degrees();
    let wrapped = heading.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative angles
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identical_points() {
        assert_eq!(distance_meters(40.6413, -73.7781, 40.6413, -73.7781), 0.0);
        assert_eq!(heading_degrees(40.6413, -73.7781, 40.6413, -73.7781), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        // 1 degree of arc on a 6371 km sphere
        let d = distance_meters(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(d, 111_194.9, max_relative = 1e-4);
    }

    #[test]
    fn test_symmetry() {
        let a = distance_meters(51.47, -0.4543, 40.6413, -73.7781);
        let b = distance_meters(40.6413, -73.7781, 51.47, -0.4543);
        assert_relative_eq!(a, b, epsilon = 1e-6);
        // LHR -> JFK is roughly 5540 km
        assert!(a > 5_500_000.0 && a < 5_600_000.0);
    }

    #[test]
    fn test_cardinal_headings() {
        assert_relative_eq!(heading_degrees(0.0, 0.0, 1.0, 0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(heading_degrees(0.0, 0.0, 0.0, 1.0), 90.0, epsilon = 1e-9);
        assert_relative_eq!(heading_degrees(0.0, 0.0, -1.0, 0.0), 180.0, epsilon = 1e-9);
        assert_relative_eq!(heading_degrees(0.0, 0.0, 0.0, -1.0), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_range() {
        for (dlat, dlon) in [(0.3, -0.2), (-0.1, -0.0001), (-1e-12, -1.0), (2.0, 0.5)] {
            let h = heading_degrees(10.0, 10.0, 10.0 + dlat, 10.0 + dlon);
            assert!((0.0..360.0).contains(&h), "heading {h} out of range");
        }
    }
}
