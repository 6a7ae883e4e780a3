//! Point features fed into the clustering engine.

use crate::bbox::BoundingBox2D;
use geo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form feature properties.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Set to `true` on every cluster feature.
pub const IS_CLUSTER_KEY: &str = "isCluster";
/// Number of leaf features represented by a cluster.
pub const CLUSTER_SIZE_KEY: &str = "clusterSize";
/// Pyramid level a cluster was formed at.
pub const ZOOM_KEY: &str = "zoom";

/// Property keys owned by the engine.
pub const RESERVED_KEYS: [&str; 3] = [IS_CLUSTER_KEY, CLUSTER_SIZE_KEY, ZOOM_KEY];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Stable feature identity, unique within its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Number(i64),
    String(String),
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for FeatureId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for FeatureId {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// An immutable point feature.
///
/// # Examples
///
/// ```
/// use spatio_cluster_types::feature::Feature;
/// use geo::Point;
///
/// let feature = Feature::new("cafe-1", Point::new(13.4, 52.5));
/// assert_eq!(feature.bbox.center(), Point::new(13.4, 52.5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub point: Point,
    /// Optional third coordinate; clustering only uses longitude/latitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub properties: Properties,
    pub bbox: BoundingBox2D,
}

impl Feature {
    pub fn new(id: impl Into<FeatureId>, point: Point) -> Self {
        Self {
            id: id.into(),
            point,
            altitude: None,
            properties: Properties::new(),
            bbox: BoundingBox2D::from_point(&point),
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Set a single property.
    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(feature = "geojson")]
mod geojson_conv {
    use super::*;
    use geojson::{Geometry, Value, feature::Id};

    impl TryFrom<geojson::Feature> for Feature {
        type Error = String;

        fn try_from(value: geojson::Feature) -> Result<Self, Self::Error> {
            let id = match value.id {
                Some(Id::String(s)) => FeatureId::String(s),
                Some(Id::Number(n)) => n
                    .as_i64()
                    .map(FeatureId::Number)
                    .unwrap_or_else(|| FeatureId::String(n.to_string())),
                None => return Err("feature has no id".to_string()),
            };

            let geometry = value
                .geometry
                .ok_or_else(|| format!("feature {} has no geometry", id))?;

            let coords = match geometry.value {
                Value::Point(coords) => coords,
                _ => return Err(format!("feature {} is not a Point", id)),
            };
            if coords.len() < 2 {
                return Err(format!("feature {} has fewer than 2 coordinates", id));
            }

            let mut feature = Feature::new(id, Point::new(coords[0], coords[1]));
            if let Some(z) = coords.get(2) {
                feature.altitude = Some(*z);
            }
            if let Some(properties) = value.properties {
                feature.properties = properties;
            }
            Ok(feature)
        }
    }

    impl Feature {
        /// Convert into a GeoJSON feature.
        pub fn to_geojson(&self) -> geojson::Feature {
            let mut coords = vec![self.point.x(), self.point.y()];
            if let Some(z) = self.altitude {
                coords.push(z);
            }
            let id = match &self.id {
                FeatureId::Number(n) => Id::Number((*n).into()),
                FeatureId::String(s) => Id::String(s.clone()),
            };
            geojson::Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(coords))),
                id: Some(id),
                properties: Some(self.properties.clone()),
                foreign_members: None,
            }
        }
    }
}
