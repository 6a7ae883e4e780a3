//! Validation for incoming features.
//!
//! The clustering engine assumes every feature it receives has a usable
//! coordinate and bounding box. Sources run these checks while preparing
//! features so malformed input is rejected before it reaches a pyramid.

use crate::error::{ClusterError, Result};
use geo::Point;
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::feature::Feature;
use spatio_cluster_types::projection::MAX_LATITUDE;

/// Validates a point has valid longitude and latitude.
///
/// Longitude: [-180.0, 180.0], Latitude: [-90.0, 90.0]
///
/// # Examples
///
/// ```
/// use spatio_cluster::compute::validation::validate_geographic_point;
/// use geo::Point;
///
/// let nyc = Point::new(-74.0060, 40.7128);
/// assert!(validate_geographic_point(&nyc).is_ok());
///
/// assert!(validate_geographic_point(&Point::new(200.0, 40.0)).is_err());
/// assert!(validate_geographic_point(&Point::new(-74.0, 95.0)).is_err());
/// ```
pub fn validate_geographic_point(point: &Point) -> Result<()> {
    let (x, y) = (point.x(), point.y());

    if !x.is_finite() {
        return Err(ClusterError::InvalidInput(format!(
            "Longitude must be finite, got: {}",
            x
        )));
    }

    if !y.is_finite() {
        return Err(ClusterError::InvalidInput(format!(
            "Latitude must be finite, got: {}",
            y
        )));
    }

    if !(-180.0..=180.0).contains(&x) {
        return Err(ClusterError::InvalidInput(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            x
        )));
    }

    if !(-90.0..=90.0).contains(&y) {
        return Err(ClusterError::InvalidInput(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            y
        )));
    }

    Ok(())
}

/// Validates a bounding box is finite and correctly ordered.
pub fn validate_bbox(bbox: &BoundingBox2D) -> Result<()> {
    if !bbox.is_finite() {
        return Err(ClusterError::InvalidInput(
            "Bounding box coordinates must be finite".to_string(),
        ));
    }
    validate_geographic_point(&Point::new(bbox.min_x(), bbox.min_y()))?;
    validate_geographic_point(&Point::new(bbox.max_x(), bbox.max_y()))?;
    Ok(())
}

/// Validates a feature before it enters a source.
///
/// The feature's coordinate must be geographic and inside the Web Mercator
/// latitude range covered by tiles, its altitude finite when present, and its
/// bounding box must contain the coordinate.
pub fn validate_feature(feature: &Feature) -> Result<()> {
    validate_geographic_point(&feature.point)
        .map_err(|e| ClusterError::InvalidInput(format!("Feature {}: {}", feature.id, e)))?;

    if feature.point.y().abs() > MAX_LATITUDE {
        return Err(ClusterError::InvalidInput(format!(
            "Feature {}: latitude beyond the Web Mercator limit of ±{}: {}",
            feature.id,
            MAX_LATITUDE,
            feature.point.y()
        )));
    }

    if let Some(z) = feature.altitude
        && !z.is_finite()
    {
        return Err(ClusterError::InvalidInput(format!(
            "Feature {}: altitude must be finite, got: {}",
            feature.id, z
        )));
    }

    if !feature.bbox.is_finite() || !feature.bbox.contains_point(&feature.point) {
        return Err(ClusterError::InvalidInput(format!(
            "Feature {}: bounding box does not cover its coordinate",
            feature.id
        )));
    }

    Ok(())
}

/// Validates multiple features, reporting the first failure.
pub fn validate_features(features: &[Feature]) -> Result<()> {
    for (idx, feature) in features.iter().enumerate() {
        validate_feature(feature)
            .map_err(|e| ClusterError::InvalidInput(format!("Feature at index {}: {}", idx, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_geographic_point() {
        assert!(validate_geographic_point(&Point::new(0.0, 0.0)).is_ok());
        assert!(validate_geographic_point(&Point::new(180.0, 90.0)).is_ok());
        assert!(validate_geographic_point(&Point::new(-180.0, -90.0)).is_ok());
    }

    #[test]
    fn test_non_finite_coordinates() {
        assert!(validate_geographic_point(&Point::new(f64::NAN, 0.0)).is_err());
        assert!(validate_geographic_point(&Point::new(0.0, f64::INFINITY)).is_err());
    }

    #[test]
    fn test_validate_feature() {
        let good = Feature::new(1, Point::new(10.0, 10.0));
        assert!(validate_feature(&good).is_ok());

        let mut bad_bbox = good.clone();
        bad_bbox.bbox = BoundingBox2D::new(0.0, 0.0, 1.0, 1.0);
        assert!(validate_feature(&bad_bbox).is_err());

        let bad_alt = good.clone().with_altitude(f64::NAN);
        assert!(validate_feature(&bad_alt).is_err());

        let polar = Feature::new(2, Point::new(0.0, 86.0));
        assert!(validate_geographic_point(&polar.point).is_ok());
        assert!(validate_feature(&polar).is_err());
        assert!(validate_feature(&Feature::new(3, Point::new(0.0, -MAX_LATITUDE))).is_ok());
    }

    #[test]
    fn test_validate_features_reports_index() {
        let features = vec![
            Feature::new(1, Point::new(10.0, 10.0)),
            Feature::new(2, Point::new(500.0, 10.0)),
        ];
        let err = validate_features(&features).unwrap_err();
        assert!(err.to_string().contains("index 1"));
    }

    #[test]
    fn test_validate_bbox() {
        assert!(validate_bbox(&BoundingBox2D::new(-10.0, -10.0, 10.0, 10.0)).is_ok());
        assert!(validate_bbox(&BoundingBox2D::new(-190.0, -10.0, 10.0, 10.0)).is_err());
    }
}
