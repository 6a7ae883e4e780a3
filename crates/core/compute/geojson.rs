//! GeoJSON ingestion of point features and export of cluster tiles.

use crate::compute::validation::validate_features;
use crate::error::{ClusterError, Result};
use crate::provider::{ClusterTile, TileFeature};
use geojson::{FeatureCollection, GeoJson, Geometry, Value, feature::Id};
use spatio_cluster_types::feature::Feature;
use uuid::Uuid;

/// Parse a FeatureCollection or a single Feature of Point geometries.
///
/// Features without an id get a random UUID. Any non-Point geometry or
/// out-of-range coordinate rejects the whole document.
///
/// ```rust
/// use spatio_cluster::compute::geojson::features_from_geojson;
///
/// let json = r#"{"type": "FeatureCollection", "features": [
///     {"type": "Feature", "id": 1, "properties": {"kind": "cafe"},
///      "geometry": {"type": "Point", "coordinates": [13.4, 52.5]}}
/// ]}"#;
/// let features = features_from_geojson(json).unwrap();
/// assert_eq!(features[0].properties["kind"], "cafe");
/// ```
pub fn features_from_geojson(geojson: &str) -> Result<Vec<Feature>> {
    let parsed: GeoJson = geojson
        .parse()
        .map_err(|e| ClusterError::InvalidInput(format!("Failed to parse GeoJSON: {}", e)))?;

    let raw = match parsed {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(ClusterError::InvalidInput(
                "Expected a Feature or FeatureCollection, got a bare geometry".to_string(),
            ));
        }
    };

    let features = raw
        .into_iter()
        .map(|mut feature| {
            if feature.id.is_none() {
                feature.id = Some(Id::String(Uuid::new_v4().to_string()));
            }
            Feature::try_from(feature).map_err(ClusterError::InvalidInput)
        })
        .collect::<Result<Vec<_>>>()?;

    validate_features(&features)?;
    Ok(features)
}

fn tile_feature_to_geojson(item: &TileFeature) -> geojson::Feature {
    match item {
        TileFeature::Point(feature) => feature.to_geojson(),
        TileFeature::Cluster(cluster) => geojson::Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(vec![
                cluster.position.x(),
                cluster.position.y(),
            ]))),
            id: Some(Id::String(cluster.id.to_string())),
            properties: Some(cluster.properties.clone()),
            foreign_members: None,
        },
    }
}

/// Serialize a tile as a FeatureCollection of points.
pub fn tile_to_geojson(tile: &ClusterTile) -> Result<String> {
    let collection = FeatureCollection {
        bbox: None,
        features: tile.features.iter().map(tile_feature_to_geojson).collect(),
        foreign_members: None,
    };
    serde_json::to_string(&collection)
        .map_err(|e| ClusterError::Serialization(format!("Failed to serialize tile: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Cluster, ClusterId};
    use geo::Point;
    use spatio_cluster_types::feature::FeatureId;
    use spatio_cluster_types::quadkey::Quadkey;

    #[test]
    fn test_missing_ids_get_uuids() {
        let json = r#"{"type": "Feature", "properties": null,
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}}"#;
        let features = features_from_geojson(json).unwrap();
        match &features[0].id {
            FeatureId::String(s) => assert!(Uuid::parse_str(s).is_ok()),
            other => panic!("expected uuid id, got {other:?}"),
        }
        assert_eq!(features[0].point, Point::new(1.0, 2.0));
    }

    #[test]
    fn test_rejects_non_points_and_bad_coordinates() {
        let line = r#"{"type": "Feature", "id": 1, "properties": null,
            "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}}"#;
        assert!(matches!(
            features_from_geojson(line),
            Err(ClusterError::InvalidInput(_))
        ));

        let far = r#"{"type": "Feature", "id": 1, "properties": null,
            "geometry": {"type": "Point", "coordinates": [200.0, 0.0]}}"#;
        assert!(features_from_geojson(far).is_err());

        let bare = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        assert!(features_from_geojson(bare).is_err());
        assert!(features_from_geojson("not json").is_err());
    }

    #[test]
    fn test_tile_export() {
        let tile = ClusterTile {
            quadkey: Quadkey::root(),
            content_bounds: Quadkey::root().bounds(),
            features: vec![
                TileFeature::Cluster(Cluster::new(ClusterId(4), 3, Point::new(1.0, 2.0), 5)),
                TileFeature::Point(Feature::new("p", Point::new(3.0, 4.0))),
            ],
        };
        let json = tile_to_geojson(&tile).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["id"], "c4");
        assert_eq!(features[0]["properties"]["clusterSize"], 5);
        assert_eq!(features[1]["id"], "p");
    }
}
