//! The raw feature provider the clustering engine consumes.
//!
//! A source serves tiles of point features asynchronously and reports changes
//! through [`SourceEvent`]s delivered synchronously to its subscribers.

use crate::error::Result;
use futures::future::BoxFuture;
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::feature::Feature;
use spatio_cluster_types::quadkey::Quadkey;
use std::sync::Arc;

pub mod local;

pub use local::LocalSource;

/// A loaded source tile.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTile {
    pub quadkey: Quadkey,
    pub features: Vec<Feature>,
    pub content_bounds: BoundingBox2D,
}

impl SourceTile {
    pub fn new(quadkey: Quadkey, features: Vec<Feature>) -> Self {
        let content_bounds = quadkey.bounds();
        Self {
            quadkey,
            features,
            content_bounds,
        }
    }
}

/// Change notifications emitted by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    FeaturesAdded {
        features: Vec<Feature>,
        tiles: Vec<Quadkey>,
    },
    FeaturesRemoved {
        features: Vec<Feature>,
        tiles: Vec<Quadkey>,
    },
    /// Existing features replaced in place, as `(previous, current)` pairs.
    FeaturesUpdated {
        changes: Vec<(Feature, Feature)>,
        tiles: Vec<Quadkey>,
    },
    /// The source evicted a tile from its cache.
    TileDestroyed(Quadkey),
    /// The source dropped everything, or everything inside the box.
    Cleared(Option<BoundingBox2D>),
}

pub type SourceListener = Arc<dyn Fn(&SourceEvent) + Send + Sync>;

/// Capability the engine needs from the feature provider.
pub trait TileSource: Send + Sync {
    /// Load the features of `quadkey`. The future must not borrow the source.
    fn load_tile(&self, quadkey: &Quadkey) -> BoxFuture<'static, Result<Arc<SourceTile>>>;

    /// Source tile a request for `quadkey` is served from. Requests deeper
    /// than the source's data level share their ancestor's tile.
    fn covering_tile(&self, quadkey: &Quadkey) -> Quadkey {
        quadkey.clone()
    }

    /// Register for change events. Listeners are called without any source
    /// lock held.
    fn subscribe(&self, listener: SourceListener);

    fn clear(&self, bbox: Option<&BoundingBox2D>);
}
