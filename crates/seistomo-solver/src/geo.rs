//! Spherical to local Cartesian coordinates.
//!
//! The local frame is centred on `(lon0, lat0)` on the Earth's surface and
//! rotated by `lat0` so that its `Z` axis points down. `X` grows eastwards,
//! `Y` northwards, and `Z` is approximately depth in km.

use std::f64::consts::PI;

/// Mean Earth radius used by the solver, km.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const DEG: f64 = PI / 180.0;

/// A tangent-plane frame anchored at a geographic origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub lon0: f64,
    pub lat0: f64,
}

impl LocalFrame {
    pub fn new(lon0: f64, lat0: f64) -> Self {
        Self { lon0, lat0 }
    }

    /// Convert longitude/latitude (degrees) and depth (km, positive down)
    /// to `[x, y, z]` in km.
    pub fn to_local(&self, lon: f64, lat: f64, depth_km: f64) -> [f64; 3] {
        let r = EARTH_RADIUS_KM - depth_km;
        let dlon = (lon - self.lon0) * DEG;
        let lat = lat * DEG;

        let y1 = r * dlon.cos() * lat.cos();
        let x = r * dlon.sin() * lat.cos();
        let z1 = r * lat.sin();

        let (sin_t, cos_t) = (self.lat0 * DEG).sin_cos();
        let y = -y1 * sin_t + z1 * cos_t;
        let z = EARTH_RADIUS_KM - (y1 * cos_t + z1 * sin_t);

        [x, y, z]
    }

    /// Inverse of [`to_local`](Self::to_local): returns
    /// `(lon, lat, depth_km)`.
    pub fn to_geographic(&self, [x, y, z]: [f64; 3]) -> (f64, f64, f64) {
        let (sin_t, cos_t) = (self.lat0 * DEG).sin_cos();
        let w = EARTH_RADIUS_KM - z;

        let y1 = w * cos_t - y * sin_t;
        let z1 = w * sin_t + y * cos_t;
        let r = (x * x + y1 * y1 + z1 * z1).sqrt();

        let lat = (z1 / r).asin() / DEG;
        let lon = self.lon0 + x.atan2(y1) / DEG;

        (lon, lat, EARTH_RADIUS_KM - r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_round_trip(frame: LocalFrame, lon: f64, lat: f64, depth: f64) {
        let local = frame.to_local(lon, lat, depth);
        let (lon2, lat2, depth2) = frame.to_geographic(local);
        assert!((lon - lon2).abs() < 1e-6, "lon {} -> {}", lon, lon2);
        assert!((lat - lat2).abs() < 1e-6, "lat {} -> {}", lat, lat2);
        assert!((depth - depth2).abs() < 1e-6, "depth {} -> {}", depth, depth2);
    }

    #[test]
    fn test_origin_maps_to_zero() {
        let frame = LocalFrame::new(30.0, 70.0);
        let [x, y, z] = frame.to_local(30.0, 70.0, 0.0);
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
        assert!(z.abs() < 1e-9);
    }

    #[test]
    fn test_depth_is_down() {
        let frame = LocalFrame::new(30.0, 70.0);
        let [_, _, z] = frame.to_local(30.0, 70.0, 12.5);
        assert!((z - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_axes_point_east_and_north() {
        let frame = LocalFrame::new(30.0, 45.0);
        let [x, _, _] = frame.to_local(30.5, 45.0, 0.0);
        let [_, y, _] = frame.to_local(30.0, 45.5, 0.0);
        assert!(x > 0.0);
        assert!(y > 0.0);
    }

    #[test]
    fn test_round_trip_equatorial() {
        let frame = LocalFrame::new(10.0, 0.0);
        assert_round_trip(frame, 10.3, -0.4, 5.0);
        assert_round_trip(frame, 9.1, 0.9, -1.2);
    }

    #[test]
    fn test_round_trip_mid_latitude() {
        let frame = LocalFrame::new(-120.0, 45.0);
        assert_round_trip(frame, -119.2, 45.7, 30.0);
        assert_round_trip(frame, -121.0, 44.1, -2.0);
    }

    #[test]
    fn test_round_trip_near_polar() {
        let frame = LocalFrame::new(127.0, 85.0);
        assert_round_trip(frame, 128.5, 85.3, 15.0);
        assert_round_trip(frame, 125.0, 84.6, 0.0);
    }
}
