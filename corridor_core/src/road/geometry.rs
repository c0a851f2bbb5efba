// corridor_core/src/road/geometry.rs

//! Planar geometry used to describe the corridor and to relate GPS fixes to it.

use nalgebra::Point2;
use std::f64::consts::{PI, TAU};

/// Equatorial Earth radius (WGS-84), in meters.
pub const EARTH_RADIUS: f64 = 6.378137e6;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub long: f64,
}

/// Equirectangular projection of `point` onto a local plane centered at `center`.
/// `x` grows eastward, `y` northward, both in meters.
pub fn project(point: GeoPoint, center: GeoPoint) -> Point2<f64> {
    let x = EARTH_RADIUS * (point.long - center.long).to_radians() * center.lat.to_radians().cos();
    let y = EARTH_RADIUS * (point.lat - center.lat).to_radians();
    Point2::new(x, y)
}

/// Mean latitude / longitude of a set of points. `None` when empty.
pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, long) = points
        .iter()
        .fold((0.0, 0.0), |(lat, long), p| (lat + p.lat, long + p.long));
    Some(GeoPoint {
        lat: lat / n,
        long: long / n,
    })
}

/// Distance from `point` to the segment `[start, end]`.
///
/// The projection is clamped to the segment, so points beyond either end are
/// measured to the nearest endpoint. A degenerate segment is treated as a point.
pub fn point_segment_distance(point: &Point2<f64>, start: &Point2<f64>, end: &Point2<f64>) -> f64 {
    let line = end - start;
    let len_sqr = line.norm_squared();
    if len_sqr == 0.0 {
        return (point - start).norm();
    }
    let t = ((point - start).dot(&line) / len_sqr).clamp(0.0, 1.0);
    let projection = start + line * t;
    (point - projection).norm()
}

/// Wraps an angle into `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

/// Absolute heading difference in `[0, π]`.
pub fn heading_difference(a: f64, b: f64) -> f64 {
    wrap_angle(a - b).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn projection_of_center_is_origin() {
        let center = GeoPoint {
            lat: 37.78,
            long: -122.41,
        };
        let p = project(center, center);
        assert_abs_diff_eq!(p.x, 0.0);
        assert_abs_diff_eq!(p.y, 0.0);
    }

    #[test]
    fn one_millidegree_north_is_about_111_meters() {
        let center = GeoPoint { lat: 0.0, long: 0.0 };
        let p = project(GeoPoint { lat: 0.001, long: 0.0 }, center);
        assert_abs_diff_eq!(p.y, 111.319, epsilon = 1e-2);
    }

    #[test]
    fn distance_is_clamped_to_segment_ends() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(10.0, 0.0);
        assert_abs_diff_eq!(point_segment_distance(&Point2::new(5.0, 3.0), &a, &b), 3.0);
        assert_abs_diff_eq!(point_segment_distance(&Point2::new(13.0, 4.0), &a, &b), 5.0);
        assert_abs_diff_eq!(point_segment_distance(&Point2::new(3.0, 4.0), &a, &a), 5.0);
    }

    #[test]
    fn heading_difference_wraps_around_pi() {
        assert_abs_diff_eq!(heading_difference(PI - 0.1, -PI + 0.1), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-PI), PI);
    }
}
