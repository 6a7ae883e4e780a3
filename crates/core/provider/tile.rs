//! Materialized tiles handed to the consumer.

use crate::cluster::Cluster;
use crate::config::ClusterConfig;
use crate::source::SourceTile;
use serde::Serialize;
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::feature::Feature;
use spatio_cluster_types::quadkey::Quadkey;

/// One renderable item of a tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TileFeature {
    Cluster(Cluster),
    /// Raw source feature, served above the clustering ceiling.
    Point(Feature),
}

impl TileFeature {
    /// Leaf features represented by this item.
    pub fn size(&self) -> usize {
        match self {
            Self::Cluster(c) => c.size,
            Self::Point(_) => 1,
        }
    }

    pub fn as_cluster(&self) -> Option<&Cluster> {
        match self {
            Self::Cluster(c) => Some(c),
            Self::Point(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterTile {
    pub quadkey: Quadkey,
    pub content_bounds: BoundingBox2D,
    pub features: Vec<TileFeature>,
}

impl ClusterTile {
    pub(crate) fn from_source(tile: &SourceTile) -> Self {
        Self {
            quadkey: tile.quadkey.clone(),
            content_bounds: tile.content_bounds,
            features: tile.features.iter().cloned().map(TileFeature::Point).collect(),
        }
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.features.iter().filter_map(TileFeature::as_cluster)
    }

    /// Sum of item sizes.
    pub fn total_size(&self) -> usize {
        self.features.iter().map(TileFeature::size).sum()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Tile bounds grown by `tile_margin` pixels on every side.
pub(crate) fn content_bounds(quadkey: &Quadkey, config: &ClusterConfig) -> BoundingBox2D {
    let bounds = quadkey.bounds();
    if config.tile_margin <= 0.0 {
        return bounds;
    }
    let size = f64::from(config.tile_size);
    let dx = bounds.width() / size * config.tile_margin;
    let dy = bounds.height() / size * config.tile_margin;
    bounds.pad(dx, dy)
}
