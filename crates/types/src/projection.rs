//! Web Mercator pixel math.
//!
//! Pixel coordinates are measured in a square world of `world_size(zoom)`
//! pixels per side, with the origin at the north-west corner.

use std::f64::consts::PI;

/// Latitude limit of the Web Mercator square.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// Edge length in pixels of the whole world at `zoom`.
#[inline]
pub fn world_size(tile_size: f64, zoom: u8) -> f64 {
    tile_size * f64::from(1u32 << zoom.min(31))
}

/// Project longitude/latitude to world pixel coordinates.
pub fn lon_lat_to_pixel(lon: f64, lat: f64, world_size: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = (lon + 180.0) / 360.0 * world_size;
    let sin = lat.to_radians().sin();
    let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * world_size;
    (x, y)
}

/// Inverse of [`lon_lat_to_pixel`].
pub fn pixel_to_lon_lat(x: f64, y: f64, world_size: f64) -> (f64, f64) {
    let lon = x / world_size * 360.0 - 180.0;
    let n = PI - 2.0 * PI * y / world_size;
    let lat = n.sinh().atan().to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_maps_to_center() {
        let size = world_size(256.0, 0);
        let (x, y) = lon_lat_to_pixel(0.0, 0.0, size);
        assert!((x - 128.0).abs() < 1e-9);
        assert!((y - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_is_stable() {
        let size = world_size(256.0, 13);
        let (x, y) = lon_lat_to_pixel(10.0, 50.0, size);
        let (lon, lat) = pixel_to_lon_lat(x, y, size);
        assert!((lon - 10.0).abs() < 1e-9);
        assert!((lat - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_latitude_is_clamped() {
        let size = world_size(256.0, 0);
        let (_, top) = lon_lat_to_pixel(0.0, 90.0, size);
        assert!(top.abs() < 1e-6);
    }
}
