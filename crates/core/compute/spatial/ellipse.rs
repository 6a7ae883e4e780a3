//! Pixel-radius proximity in longitude/latitude space.
//!
//! A fixed screen distance maps to different longitude and latitude spans
//! once away from the equator, so the merge test is an axis-aligned ellipse
//! rather than a circle. The semi-axes are derived from one anchor point
//! and reused for a whole batch.

use geo::Point;
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::projection::{lon_lat_to_pixel, pixel_to_lon_lat, world_size};

/// Axis-aligned search ellipse with geographic semi-axes in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchEllipse {
    /// Longitude semi-axis.
    pub rx: f64,
    /// Latitude semi-axis.
    pub ry: f64,
}

impl SearchEllipse {
    /// Ellipse for `radius` pixels around `anchor` at `zoom`.
    ///
    /// The anchor is projected to pixels, offset diagonally by `radius`, and
    /// projected back; the coordinate deltas become the semi-axes.
    ///
    /// ```
    /// use spatio_cluster::compute::spatial::SearchEllipse;
    /// use geo::Point;
    ///
    /// let e = SearchEllipse::from_pixel_radius(&Point::new(10.0, 60.0), 32.0, 256, 13);
    /// // Away from the equator a pixel spans less latitude than longitude.
    /// assert!(e.ry < e.rx);
    /// ```
    pub fn from_pixel_radius(anchor: &Point, radius: f64, tile_size: u32, zoom: u8) -> Self {
        let size = world_size(f64::from(tile_size), zoom);
        let (px, py) = lon_lat_to_pixel(anchor.x(), anchor.y(), size);
        let (lon, lat) = pixel_to_lon_lat(px, py, size);
        let (corner_lon, corner_lat) = pixel_to_lon_lat(px + radius, py + radius, size);
        Self {
            rx: (corner_lon - lon).abs(),
            ry: (corner_lat - lat).abs(),
        }
    }

    /// Squared normalized distance; `<= 1.0` means inside.
    #[inline]
    pub fn normalized_distance(&self, center: &Point, point: &Point) -> f64 {
        let dx = (point.x() - center.x()) / self.rx;
        let dy = (point.y() - center.y()) / self.ry;
        dx * dx + dy * dy
    }

    #[inline]
    pub fn contains(&self, center: &Point, point: &Point) -> bool {
        self.normalized_distance(center, point) <= 1.0
    }

    /// Bounding box of the ellipse centred on `center`, used as a pre-filter.
    pub fn envelope(&self, center: &Point) -> BoundingBox2D {
        BoundingBox2D::around(center, self.rx, self.ry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equator_is_nearly_circular() {
        let e = SearchEllipse::from_pixel_radius(&Point::new(0.0, 0.0), 32.0, 256, 10);
        assert!((e.rx - e.ry).abs() / e.rx < 1e-3);
        // 32 px at zoom 10 with 256 px tiles.
        let expected = 32.0 * 360.0 / (256.0 * 1024.0);
        assert!((e.rx - expected).abs() < 1e-12);
    }

    #[test]
    fn test_radius_halves_per_zoom() {
        let anchor = Point::new(10.0, 10.0);
        let z5 = SearchEllipse::from_pixel_radius(&anchor, 32.0, 256, 5);
        let z6 = SearchEllipse::from_pixel_radius(&anchor, 32.0, 256, 6);
        assert!((z5.rx / z6.rx - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_contains_and_envelope() {
        let e = SearchEllipse { rx: 2.0, ry: 1.0 };
        let c = Point::new(0.0, 0.0);
        assert!(e.contains(&c, &Point::new(1.9, 0.0)));
        assert!(!e.contains(&c, &Point::new(0.0, 1.1)));
        // Inside the envelope corner but outside the ellipse.
        assert!(!e.contains(&c, &Point::new(1.9, 0.9)));
        assert_eq!(e.envelope(&c), BoundingBox2D::new(-2.0, -1.0, 2.0, 1.0));
    }
}
