//! One `ClusterStore` per zoom level, updated finest-first.

use crate::cluster::aggregation::{self, ClusterDelta, GrowContext, Snapshot};
use crate::cluster::store::ClusterStore;
use crate::cluster::{Cluster, ClusterIdGenerator, MemberKey};
use crate::compute::spatial::{RTreeIndex, SpatialIndex};
use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::hooks::{DefaultAggregator, PropertyAggregator};
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::feature::{Feature, FeatureId};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Grow,
    Shrink,
}

/// The full clustering hierarchy for `min_zoom..=cluster_max_zoom`.
///
/// Source features enter at the finest level; each level's changes are fed
/// to the next coarser one until nothing changes or `min_zoom` is reached.
pub struct ClusterPyramid<I: SpatialIndex = RTreeIndex> {
    config: ClusterConfig,
    hooks: Arc<dyn PropertyAggregator>,
    /// Index 0 is `min_zoom`.
    levels: Vec<ClusterStore<I>>,
    ids: ClusterIdGenerator,
}

impl<I: SpatialIndex> fmt::Debug for ClusterPyramid<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterPyramid")
            .field("config", &self.config)
            .field("levels", &self.levels.len())
            .finish_non_exhaustive()
    }
}

impl<I: SpatialIndex> ClusterPyramid<I> {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        Self::with_hooks(config, Arc::new(DefaultAggregator))
    }

    pub fn with_hooks(config: ClusterConfig, hooks: Arc<dyn PropertyAggregator>) -> Result<Self> {
        config.validate().map_err(ClusterError::InvalidConfig)?;
        let levels = (config.min_zoom..=config.cluster_max_zoom)
            .map(ClusterStore::new)
            .collect();
        Ok(Self {
            config,
            hooks,
            levels,
            ids: ClusterIdGenerator::new(),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn min_zoom(&self) -> u8 {
        self.config.min_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.config.cluster_max_zoom
    }

    fn level_index(&self, zoom: u8) -> Option<usize> {
        if zoom < self.min_zoom() || zoom > self.max_zoom() {
            return None;
        }
        Some(usize::from(zoom - self.min_zoom()))
    }

    pub fn store(&self, zoom: u8) -> Option<&ClusterStore<I>> {
        self.levels.get(self.level_index(zoom)?)
    }

    /// Clusters at `zoom`, in no particular order.
    pub fn clusters(&self, zoom: u8) -> Vec<&Cluster> {
        self.store(zoom)
            .map(|store| store.all().collect())
            .unwrap_or_default()
    }

    /// Cluster features, finest level first.
    ///
    /// With `drop_duplicates` set, features already clustered at the finest
    /// level are skipped; otherwise they are treated as moved or updated.
    /// Returns the dirty area of every level that changed.
    pub fn grow(&mut self, features: &[Feature], drop_duplicates: bool) -> Vec<(u8, BoundingBox2D)> {
        let batch = features.iter().map(ClusterDelta::added).collect();
        self.cascade(self.levels.len(), batch, drop_duplicates, Pass::Grow)
    }

    /// Remove features, dissolving emptied clusters on every level.
    pub fn shrink(&mut self, features: &[Feature]) -> Vec<(u8, BoundingBox2D)> {
        let batch = features.iter().map(ClusterDelta::removed).collect();
        self.cascade(self.levels.len(), batch, false, Pass::Shrink)
    }

    /// Re-cluster features whose position or properties changed, given as
    /// `(previous, current)` pairs.
    ///
    /// A feature that was never clustered is added. Clusters shift in place;
    /// a moved feature does not migrate to another cluster.
    pub fn update(&mut self, changes: &[(Feature, Feature)]) -> Vec<(u8, BoundingBox2D)> {
        let Some(finest) = self.levels.last() else {
            return Vec::new();
        };
        let batch = changes
            .iter()
            .map(|(previous, current)| {
                let key = MemberKey::Feature(current.id.clone());
                let before = finest
                    .cluster_slot(&key)
                    .map(|_| Snapshot::of_feature(previous));
                ClusterDelta {
                    key,
                    before,
                    after: Some(Snapshot::of_feature(current)),
                }
            })
            .collect();
        self.cascade(self.levels.len(), batch, false, Pass::Grow)
    }

    /// Feed `batch` to the levels below index `top`, coarsening as it goes.
    fn cascade(
        &mut self,
        top: usize,
        mut batch: Vec<ClusterDelta>,
        drop_duplicates: bool,
        pass: Pass,
    ) -> Vec<(u8, BoundingBox2D)> {
        let mut dirty = Vec::new();
        let finest = self.levels.len().saturating_sub(1);

        for (idx, store) in self.levels[..top].iter_mut().enumerate().rev() {
            if batch.is_empty() {
                break;
            }
            let zoom = self.config.min_zoom + idx as u8;
            let mut ctx = GrowContext {
                zoom,
                config: &self.config,
                hooks: self.hooks.as_ref(),
                ids: &mut self.ids,
                // Coarser levels see finer clusters, which are never duplicates.
                drop_duplicates: drop_duplicates && idx == finest,
            };
            let update = match pass {
                Pass::Grow => aggregation::grow(store, &batch, &mut ctx),
                Pass::Shrink => aggregation::shrink(store, &batch, &mut ctx),
            };
            if let Some(bounds) = update.bounds {
                dirty.push((zoom, bounds));
            }
            batch = update.deltas;
        }

        dirty
    }

    /// Cluster containing `feature` at `zoom`, walking associations down from
    /// the finest level.
    pub fn get_cluster(&self, feature: &FeatureId, zoom: u8) -> Option<&Cluster> {
        self.level_index(zoom)?;
        let mut key = MemberKey::Feature(feature.clone());
        for z in (zoom..=self.max_zoom()).rev() {
            let cluster = self.store(z)?.get_cluster(&key)?;
            if z == zoom {
                return Some(cluster);
            }
            key = cluster.member_key();
        }
        None
    }

    /// Chain of clusters containing `feature`, finest level first.
    pub fn get_clusters(&self, feature: &FeatureId) -> Vec<&Cluster> {
        let mut chain = Vec::with_capacity(self.levels.len());
        let mut key = MemberKey::Feature(feature.clone());
        for store in self.levels.iter().rev() {
            let Some(cluster) = store.get_cluster(&key) else {
                break;
            };
            key = cluster.member_key();
            chain.push(cluster);
        }
        chain
    }

    /// Sum of cluster sizes at `zoom`; zero outside the pyramid.
    pub fn total_features_clustered(&self, zoom: u8) -> usize {
        self.store(zoom).map(ClusterStore::total_size).unwrap_or(0)
    }

    /// Forget clustered features, returning the dirty area of every level
    /// that changed.
    ///
    /// Without `bbox` every level is wiped. With one, the finest-level
    /// clusters positioned inside it are evicted together with their
    /// features, and their removal cascades to the coarser levels like a
    /// shrink, so every level keeps representing the same features. Coarser
    /// clusters inside `bbox` that hold only surviving features stay.
    pub fn clear(&mut self, bbox: Option<&BoundingBox2D>) -> Vec<(u8, BoundingBox2D)> {
        let min_zoom = self.min_zoom();
        let Some(bbox) = bbox else {
            let dirty: Vec<_> = self
                .levels
                .iter_mut()
                .enumerate()
                .filter_map(|(idx, store)| {
                    let zoom = min_zoom + idx as u8;
                    extent(&store.clear(None)).map(|bounds| (zoom, bounds))
                })
                .collect();
            log::debug!("cleared {} levels", dirty.len());
            return dirty;
        };

        let top = self.levels.len();
        let Some(finest) = self.levels.last_mut() else {
            return Vec::new();
        };
        let evicted = finest.clear(Some(bbox));
        if evicted.is_empty() {
            return Vec::new();
        }
        log::debug!("evicted {} clusters at zoom {}", evicted.len(), self.max_zoom());

        let mut dirty: Vec<_> = extent(&evicted)
            .map(|bounds| (self.max_zoom(), bounds))
            .into_iter()
            .collect();
        let batch = evicted.iter().map(ClusterDelta::dissolved).collect();
        dirty.extend(self.cascade(top - 1, batch, false, Pass::Shrink));
        dirty
    }
}

/// Smallest box covering the positions of `clusters`.
fn extent(clusters: &[Cluster]) -> Option<BoundingBox2D> {
    clusters.iter().fold(None::<BoundingBox2D>, |acc, cluster| match acc {
        Some(mut bounds) => {
            bounds.extend_point(&cluster.position);
            Some(bounds)
        }
        None => Some(BoundingBox2D::from_point(&cluster.position)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn pyramid() -> ClusterPyramid {
        ClusterPyramid::new(ClusterConfig::default()).unwrap()
    }

    fn sample() -> Vec<Feature> {
        vec![
            Feature::new(1, Point::new(10.0, 10.0)),
            Feature::new(2, Point::new(10.0001, 10.0001)),
            Feature::new(3, Point::new(50.0, 50.0)),
        ]
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ClusterConfig {
            min_zoom: 10,
            cluster_max_zoom: 4,
            ..ClusterConfig::default()
        };
        assert!(matches!(
            ClusterPyramid::<RTreeIndex>::new(config),
            Err(ClusterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_conservation_on_every_level() {
        let mut pyramid = pyramid();
        pyramid.grow(&sample(), true);

        for zoom in 2..=13 {
            assert_eq!(pyramid.total_features_clustered(zoom), 3, "zoom {zoom}");
        }
        assert_eq!(pyramid.total_features_clustered(1), 0);
        assert_eq!(pyramid.total_features_clustered(14), 0);

        let mut sizes: Vec<_> = pyramid.clusters(13).iter().map(|c| c.size).collect();
        sizes.sort();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_get_cluster_walks_levels() {
        let mut pyramid = pyramid();
        pyramid.grow(&sample(), true);

        let id = FeatureId::from(1);
        let at_13 = pyramid.get_cluster(&id, 13).unwrap();
        assert_eq!(at_13.size, 2);
        assert_eq!(at_13.zoom, 13);

        let chain = pyramid.get_clusters(&id);
        assert_eq!(chain.len(), 12);
        assert_eq!(chain[0].zoom, 13);
        assert_eq!(chain[11].zoom, 2);
        assert_eq!(pyramid.get_cluster(&id, 2), Some(chain[11]));

        assert!(pyramid.get_cluster(&id, 14).is_none());
        assert!(pyramid.get_cluster(&FeatureId::from(42), 13).is_none());
    }

    #[test]
    fn test_repeated_grow_is_idempotent() {
        let mut pyramid = pyramid();
        pyramid.grow(&sample(), true);
        let dirty = pyramid.grow(&sample(), true);

        assert!(dirty.is_empty());
        assert_eq!(pyramid.total_features_clustered(13), 3);
    }

    #[test]
    fn test_shrink_dissolves_everywhere() {
        let mut pyramid = pyramid();
        let features = sample();
        pyramid.grow(&features, true);
        pyramid.shrink(&features);

        for zoom in 2..=13 {
            let store = pyramid.store(zoom).unwrap();
            assert!(store.is_empty(), "zoom {zoom}");
            assert_eq!(store.association_count(), 0, "zoom {zoom}");
        }
    }

    #[test]
    fn test_partial_shrink_keeps_hierarchy_consistent() {
        let mut pyramid = pyramid();
        let features = sample();
        pyramid.grow(&features, true);
        let dirty = pyramid.shrink(&features[..1]);

        assert_eq!(dirty.len(), 12);
        for zoom in 2..=13 {
            assert_eq!(pyramid.total_features_clustered(zoom), 2, "zoom {zoom}");
        }
        let survivor = pyramid.get_cluster(&FeatureId::from(2), 13).unwrap();
        assert_eq!(survivor.size, 1);
        assert!((survivor.position.x() - 10.0001).abs() < 1e-9);
        assert!((survivor.position.y() - 10.0001).abs() < 1e-9);
    }

    #[test]
    fn test_update_moves_feature() {
        let mut pyramid = pyramid();
        pyramid.grow(&sample(), true);

        // Move feature 3 next to 1 and 2. It keeps its own cluster at zoom 13
        // but that cluster shifts.
        let previous = sample().remove(2);
        let moved = Feature::new(3, Point::new(12.0, 12.0));
        pyramid.update(&[(previous, moved)]);

        let cluster = pyramid.get_cluster(&FeatureId::from(3), 13).unwrap();
        assert_eq!(cluster.size, 1);
        assert_eq!(cluster.position, Point::new(12.0, 12.0));
        for zoom in 2..=13 {
            assert_eq!(pyramid.total_features_clustered(zoom), 3, "zoom {zoom}");
        }
    }

    #[test]
    fn test_clear_everything() {
        let mut pyramid = pyramid();
        pyramid.grow(&sample(), true);
        let dirty = pyramid.clear(None);
        assert_eq!(dirty.len(), 12);
        for zoom in 2..=13 {
            assert_eq!(pyramid.total_features_clustered(zoom), 0);
        }
        assert!(pyramid.get_clusters(&FeatureId::from(1)).is_empty());
    }

    fn totals(pyramid: &ClusterPyramid) -> Vec<usize> {
        (2..=13).map(|z| pyramid.total_features_clustered(z)).collect()
    }

    #[test]
    fn test_scoped_clear_keeps_levels_consistent() {
        let mut pyramid = pyramid();
        let features = vec![
            Feature::new(1, Point::new(10.0, 10.0)),
            Feature::new(2, Point::new(10.2, 10.0)),
            Feature::new(3, Point::new(50.0, 50.0)),
        ];
        pyramid.grow(&features, true);
        // Far apart at the finest level, one cluster further out.
        assert_ne!(
            pyramid.get_cluster(&FeatureId::from(1), 13).map(|c| c.id),
            pyramid.get_cluster(&FeatureId::from(2), 13).map(|c| c.id)
        );
        assert_eq!(
            pyramid.get_cluster(&FeatureId::from(1), 2).map(|c| c.id),
            pyramid.get_cluster(&FeatureId::from(2), 2).map(|c| c.id)
        );

        let bbox = BoundingBox2D::around(&Point::new(10.0, 10.0), 0.05, 0.05);
        let dirty = pyramid.clear(Some(&bbox));
        assert_eq!(dirty.first().map(|(zoom, _)| *zoom), Some(13));
        assert!(dirty.iter().any(|(zoom, _)| *zoom == 2));
        assert_eq!(totals(&pyramid), vec![2; 12]);
        assert!(pyramid.get_clusters(&FeatureId::from(1)).is_empty());
        let parent = pyramid.get_cluster(&FeatureId::from(2), 2).unwrap();
        assert_eq!(parent.size, 1);
        assert!((parent.position.x() - 10.2).abs() < 1e-9);
        assert!((parent.position.y() - 10.0).abs() < 1e-9);

        // Reloading the area counts the evicted feature once.
        pyramid.grow(&features, true);
        assert_eq!(totals(&pyramid), vec![3; 12]);
    }

    #[test]
    fn test_scoped_clear_spares_coarse_clusters_of_outside_features() {
        let mut pyramid = pyramid();
        pyramid.grow(
            &[
                Feature::new(1, Point::new(9.9, 10.0)),
                Feature::new(2, Point::new(10.1, 10.0)),
            ],
            true,
        );
        let coarse = pyramid.get_cluster(&FeatureId::from(1), 2).unwrap();
        assert!((coarse.position.x() - 10.0).abs() < 1e-9);

        let bbox = BoundingBox2D::around(&Point::new(10.0, 10.0), 0.05, 0.05);
        assert!(pyramid.clear(Some(&bbox)).is_empty());
        assert_eq!(totals(&pyramid), vec![2; 12]);
    }
}
