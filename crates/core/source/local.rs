//! In-memory `TileSource` backed by a hash map and an R*-tree of points.

use crate::compute::validation::validate_features;
use crate::error::Result;
use crate::source::{SourceEvent, SourceListener, SourceTile, TileSource};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use parking_lot::RwLock;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use rustc_hash::{FxHashMap, FxHashSet};
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::feature::{Feature, FeatureId};
use spatio_cluster_types::quadkey::Quadkey;
use std::fmt;
use std::sync::Arc;

type IndexedPoint = GeomWithData<[f64; 2], FeatureId>;

#[derive(Default)]
struct LocalState {
    features: FxHashMap<FeatureId, Feature>,
    index: RTree<IndexedPoint>,
}

impl LocalState {
    fn entry(feature: &Feature) -> IndexedPoint {
        GeomWithData::new([feature.point.x(), feature.point.y()], feature.id.clone())
    }

    fn ids_in(&self, bbox: &BoundingBox2D) -> Vec<FeatureId> {
        let envelope =
            AABB::from_corners([bbox.min_x(), bbox.min_y()], [bbox.max_x(), bbox.max_y()]);
        self.index
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data.clone())
            .collect()
    }
}

/// Features held in memory and served as tiles at any zoom.
///
/// Change events report the tiles touched at `data_zoom`, and requests
/// deeper than `data_zoom` share their ancestor's tile.
pub struct LocalSource {
    data_zoom: u8,
    state: RwLock<LocalState>,
    listeners: RwLock<Vec<SourceListener>>,
}

impl fmt::Debug for LocalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSource")
            .field("data_zoom", &self.data_zoom)
            .field("features", &self.len())
            .finish()
    }
}

impl LocalSource {
    pub fn new(data_zoom: u8) -> Self {
        Self {
            data_zoom,
            state: RwLock::new(LocalState::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn data_zoom(&self) -> u8 {
        self.data_zoom
    }

    /// Insert or replace features.
    ///
    /// The whole batch is rejected if any feature has invalid coordinates.
    /// New ids are reported as `FeaturesAdded`, replaced ones as
    /// `FeaturesUpdated`.
    pub fn add_features(&self, features: Vec<Feature>) -> Result<()> {
        validate_features(&features)?;

        let mut added = Vec::new();
        let mut updated = Vec::new();
        {
            let mut state = self.state.write();
            for feature in features {
                state.index.insert(LocalState::entry(&feature));
                match state.features.insert(feature.id.clone(), feature.clone()) {
                    Some(previous) => {
                        state.index.remove(&LocalState::entry(&previous));
                        updated.push((previous, feature));
                    }
                    None => added.push(feature),
                }
            }
        }

        if !added.is_empty() {
            let tiles = self.tiles_of(added.iter());
            self.emit(&SourceEvent::FeaturesAdded {
                features: added,
                tiles,
            });
        }
        if !updated.is_empty() {
            let tiles = self.tiles_of(updated.iter().flat_map(|(p, c)| [p, c]));
            self.emit(&SourceEvent::FeaturesUpdated {
                changes: updated,
                tiles,
            });
        }
        Ok(())
    }

    /// Remove features by id, returning the ones that existed.
    pub fn remove_features(&self, ids: &[FeatureId]) -> Vec<Feature> {
        let removed: Vec<Feature> = {
            let mut state = self.state.write();
            ids.iter()
                .filter_map(|id| {
                    let feature = state.features.remove(id)?;
                    state.index.remove(&LocalState::entry(&feature));
                    Some(feature)
                })
                .collect()
        };

        if !removed.is_empty() {
            let tiles = self.tiles_of(removed.iter());
            self.emit(&SourceEvent::FeaturesRemoved {
                features: removed.clone(),
                tiles,
            });
        }
        removed
    }

    /// Announce that `quadkey` left the source's cache.
    pub fn destroy_tile(&self, quadkey: &Quadkey) {
        self.emit(&SourceEvent::TileDestroyed(quadkey.clone()));
    }

    pub fn feature(&self, id: &FeatureId) -> Option<Feature> {
        self.state.read().features.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tiles_of<'a>(&self, features: impl Iterator<Item = &'a Feature>) -> Vec<Quadkey> {
        let mut seen = FxHashSet::default();
        features
            .filter_map(|f| Quadkey::covering(&f.point, self.data_zoom).ok())
            .filter(|q| seen.insert(q.clone()))
            .collect()
    }

    fn emit(&self, event: &SourceEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(event);
        }
    }
}

impl TileSource for LocalSource {
    fn load_tile(&self, quadkey: &Quadkey) -> BoxFuture<'static, Result<Arc<SourceTile>>> {
        let features = {
            let state = self.state.read();
            state
                .ids_in(&quadkey.bounds())
                .iter()
                .filter_map(|id| state.features.get(id).cloned())
                .collect()
        };
        log::trace!("loaded source tile {}", quadkey);
        future::ready(Ok(Arc::new(SourceTile::new(quadkey.clone(), features)))).boxed()
    }

    fn covering_tile(&self, quadkey: &Quadkey) -> Quadkey {
        if quadkey.zoom() <= self.data_zoom {
            return quadkey.clone();
        }
        let depth = usize::from(quadkey.zoom() - self.data_zoom - 1);
        quadkey
            .ancestors()
            .nth(depth)
            .unwrap_or_else(|| quadkey.clone())
    }

    fn subscribe(&self, listener: SourceListener) {
        self.listeners.write().push(listener);
    }

    fn clear(&self, bbox: Option<&BoundingBox2D>) {
        {
            let mut state = self.state.write();
            match bbox {
                None => *state = LocalState::default(),
                Some(bbox) => {
                    for id in state.ids_in(bbox) {
                        if let Some(feature) = state.features.remove(&id) {
                            state.index.remove(&LocalState::entry(&feature));
                        }
                    }
                }
            }
        }
        self.emit(&SourceEvent::Cleared(bbox.copied()));
    }
}
