use geo::{Point, Rect, coord};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in longitude (x) and latitude (y), edges inclusive.
///
/// Used for tile bounds, dirty areas produced by a clustering pass, and
/// index queries.
///
/// ```
/// use spatio_cluster_types::bbox::BoundingBox2D;
/// use geo::Point;
///
/// let mut dirty = BoundingBox2D::from_point(&Point::new(10.0, 10.0));
/// dirty.extend_point(&Point::new(12.0, 9.0));
/// assert_eq!(dirty, BoundingBox2D::new(10.0, 9.0, 12.0, 10.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2D {
    pub rect: Rect,
}

impl BoundingBox2D {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            rect: Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y }),
        }
    }

    /// Zero-area box at `point`.
    pub fn from_point(point: &Point) -> Self {
        Self::new(point.x(), point.y(), point.x(), point.y())
    }

    /// Box of half-extents `rx` by `ry` centred on `center`.
    pub fn around(center: &Point, rx: f64, ry: f64) -> Self {
        Self::new(center.x() - rx, center.y() - ry, center.x() + rx, center.y() + ry)
    }

    pub fn min_x(&self) -> f64 {
        self.rect.min().x
    }

    pub fn min_y(&self) -> f64 {
        self.rect.min().y
    }

    pub fn max_x(&self) -> f64 {
        self.rect.max().x
    }

    pub fn max_y(&self) -> f64 {
        self.rect.max().y
    }

    pub fn center(&self) -> Point {
        self.rect.center().into()
    }

    pub fn width(&self) -> f64 {
        self.rect.width()
    }

    pub fn height(&self) -> f64 {
        self.rect.height()
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        (self.min_x()..=self.max_x()).contains(&point.x())
            && (self.min_y()..=self.max_y()).contains(&point.y())
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains_bbox(&self, other: &BoundingBox2D) -> bool {
        self.contains_point(&other.rect.min().into()) && self.contains_point(&other.rect.max().into())
    }

    /// Overlap test; boxes sharing only an edge intersect.
    pub fn intersects(&self, other: &BoundingBox2D) -> bool {
        self.min_x() <= other.max_x()
            && other.min_x() <= self.max_x()
            && self.min_y() <= other.max_y()
            && other.min_y() <= self.max_y()
    }

    /// Grow by `dx` horizontally and `dy` vertically on each side.
    pub fn pad(&self, dx: f64, dy: f64) -> Self {
        Self::new(
            self.min_x() - dx,
            self.min_y() - dy,
            self.max_x() + dx,
            self.max_y() + dy,
        )
    }

    pub fn union(&self, other: &BoundingBox2D) -> Self {
        Self::new(
            self.min_x().min(other.min_x()),
            self.min_y().min(other.min_y()),
            self.max_x().max(other.max_x()),
            self.max_y().max(other.max_y()),
        )
    }

    pub fn extend_point(&mut self, point: &Point) {
        *self = self.union(&Self::from_point(point));
    }

    pub fn is_finite(&self) -> bool {
        [self.min_x(), self.min_y(), self.max_x(), self.max_y()]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_are_inclusive() {
        let tile = BoundingBox2D::new(0.0, 0.0, 90.0, 66.5);
        assert!(tile.contains_point(&Point::new(90.0, 66.5)));
        assert!(tile.contains_point(&Point::new(0.0, 10.0)));
        assert!(!tile.contains_point(&Point::new(90.0001, 10.0)));

        let neighbour = BoundingBox2D::new(90.0, 0.0, 180.0, 66.5);
        assert!(tile.intersects(&neighbour));
        assert!(!tile.intersects(&BoundingBox2D::new(91.0, 0.0, 180.0, 66.5)));
    }

    #[test]
    fn test_around_and_pad() {
        let envelope = BoundingBox2D::around(&Point::new(10.0, 60.0), 2.0, 1.0);
        assert_eq!(envelope, BoundingBox2D::new(8.0, 59.0, 12.0, 61.0));
        assert_eq!(envelope.center(), Point::new(10.0, 60.0));
        assert_eq!((envelope.width(), envelope.height()), (4.0, 2.0));

        let padded = envelope.pad(0.5, 0.25);
        assert!(padded.contains_bbox(&envelope));
        assert!(!envelope.contains_bbox(&padded));
        assert_eq!(padded.min_y(), 58.75);
    }

    #[test]
    fn test_dirty_area_accumulates() {
        let mut dirty = BoundingBox2D::from_point(&Point::new(1.0, 1.0));
        assert_eq!(dirty.width(), 0.0);
        assert!(dirty.is_finite());

        dirty.extend_point(&Point::new(-2.0, 4.0));
        let merged = dirty.union(&BoundingBox2D::new(0.0, -3.0, 0.5, 0.0));
        assert_eq!(merged, BoundingBox2D::new(-2.0, -3.0, 1.0, 4.0));

        assert!(!BoundingBox2D::new(f64::NAN, 0.0, 1.0, 1.0).is_finite());
    }
}
