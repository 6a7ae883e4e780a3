//! Public clustering API over a [`TileSource`].
//!
//! The provider subscribes to its source, keeps the [`ClusterPyramid`] in
//! step with change events, and serves lazily materialized cluster tiles.
//! Tile requests whose source data has not been clustered yet go through the
//! [`JobCoordinator`], so concurrent requests for one source tile trigger a
//! single load.

use crate::builder::ClusterProviderBuilder;
use crate::cluster::{Cluster, ClusterPyramid};
use crate::compute::spatial::SearchEllipse;
use crate::compute::validation::validate_bbox;
use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::hooks::{DefaultAggregator, PropertyAggregator};
use crate::source::{SourceEvent, SourceTile, TileSource};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use serde::Serialize;
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::feature::{Feature, FeatureId};
use spatio_cluster_types::quadkey::Quadkey;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

pub mod jobs;
pub mod tile;

pub use jobs::{JobCoordinator, JobFuture, JobTicket};
pub use tile::{ClusterTile, TileFeature};

/// Tells the consumer which cached tiles went stale and should be re-fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshEvent {
    /// Always empty; kept so consumers can treat this like a feature event.
    pub features: Vec<Feature>,
    pub tiles: Vec<Quadkey>,
}

pub type RefreshListener = Arc<dyn Fn(&RefreshEvent) + Send + Sync>;

struct ProviderInner {
    config: ClusterConfig,
    source: Arc<dyn TileSource>,
    pyramid: RwLock<ClusterPyramid>,
    /// Materialized tiles; presence means ready.
    tiles: DashMap<Quadkey, Arc<ClusterTile>>,
    /// Source tiles already fed through grow.
    loaded: RwLock<FxHashSet<Quadkey>>,
    jobs: JobCoordinator,
    listeners: RwLock<Vec<RefreshListener>>,
}

/// Incremental clustering engine bound to one source.
///
/// Cloning is cheap and clones share all state.
///
/// ```rust
/// use spatio_cluster::{ClusterConfig, ClusterProvider, LocalSource};
/// use spatio_cluster::types::{Feature, Quadkey};
/// use geo::Point;
/// use std::sync::Arc;
///
/// let source = Arc::new(LocalSource::new(8));
/// let provider = ClusterProvider::new(source.clone(), ClusterConfig::default())?;
///
/// source.add_features(vec![
///     Feature::new(1, Point::new(10.0, 10.0)),
///     Feature::new(2, Point::new(10.0001, 10.0001)),
/// ])?;
///
/// let quadkey = Quadkey::covering(&Point::new(10.0, 10.0), 13)?;
/// let tile = futures::executor::block_on(provider.get_tile(&quadkey))?;
/// assert_eq!(tile.total_size(), 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct ClusterProvider {
    inner: Arc<ProviderInner>,
}

impl fmt::Debug for ClusterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterProvider")
            .field("config", &self.inner.config)
            .field("tiles", &self.inner.tiles.len())
            .field("jobs", &self.inner.jobs)
            .finish()
    }
}

impl ClusterProvider {
    pub fn new(source: Arc<dyn TileSource>, config: ClusterConfig) -> Result<Self> {
        Self::with_hooks(source, config, Arc::new(DefaultAggregator))
    }

    pub fn with_hooks(
        source: Arc<dyn TileSource>,
        config: ClusterConfig,
        hooks: Arc<dyn PropertyAggregator>,
    ) -> Result<Self> {
        let pyramid = ClusterPyramid::with_hooks(config.clone(), hooks)?;
        let inner = Arc::new(ProviderInner {
            config,
            source: Arc::clone(&source),
            pyramid: RwLock::new(pyramid),
            tiles: DashMap::new(),
            loaded: RwLock::new(FxHashSet::default()),
            jobs: JobCoordinator::new(),
            listeners: RwLock::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        source.subscribe(Arc::new(move |event: &SourceEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_source_event(event);
            }
        }));

        log::debug!(
            "cluster provider ready for zoom {}..={}",
            inner.config.min_zoom,
            inner.config.cluster_max_zoom
        );
        Ok(Self { inner })
    }

    pub fn builder() -> ClusterProviderBuilder {
        ClusterProviderBuilder::new()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.inner.source
    }

    /// Request the clustered contents of `quadkey`.
    ///
    /// The returned handle is ready immediately when the tile is cached or
    /// its source data is already clustered; otherwise it resolves once the
    /// covering source tile has been loaded. Requests deeper than
    /// `cluster_max_zoom` return raw source points; requests shallower than
    /// `min_zoom` are served from the `min_zoom` level.
    pub fn get_tile(&self, quadkey: &Quadkey) -> TileRequest {
        let inner = &self.inner;

        if quadkey.zoom() > inner.config.cluster_max_zoom {
            let load = inner.source.load_tile(quadkey);
            return TileRequest::pending(
                quadkey.clone(),
                async move {
                    let tile = load.await?;
                    Ok::<_, ClusterError>(Arc::new(ClusterTile::from_source(&tile)))
                }
                .boxed(),
            );
        }

        if let Some(tile) = inner.tiles.get(quadkey) {
            return TileRequest::ready(quadkey.clone(), Arc::clone(tile.value()));
        }

        let source_tile = inner.source.covering_tile(quadkey);
        if inner.is_loaded(&source_tile) {
            return TileRequest::ready(quadkey.clone(), inner.materialize(quadkey));
        }

        let job = inner.jobs.join(&source_tile, |ticket| {
            ProviderInner::run_job(Arc::downgrade(inner), ticket)
        });
        let weak = Arc::downgrade(inner);
        let requested = quadkey.clone();
        TileRequest::pending(
            quadkey.clone(),
            async move {
                job.await?;
                let inner = weak.upgrade().ok_or_else(provider_dropped)?;
                Ok::<_, ClusterError>(inner.materialize(&requested))
            }
            .boxed(),
        )
    }

    /// Whether a materialized tile for `quadkey` is cached.
    pub fn is_tile_ready(&self, quadkey: &Quadkey) -> bool {
        self.inner.tiles.contains_key(quadkey)
    }

    /// Source tile loads currently in flight.
    pub fn pending_jobs(&self) -> usize {
        self.inner.jobs.in_flight()
    }

    /// Cluster containing `feature` at `zoom`, if it has been clustered.
    pub fn get_cluster(&self, feature: &FeatureId, zoom: u8) -> Option<Cluster> {
        self.inner.pyramid.read().get_cluster(feature, zoom).cloned()
    }

    /// Clusters containing `feature`, from `cluster_max_zoom` downwards,
    /// stopping at the first level where it is not clustered.
    pub fn get_clusters(&self, feature: &FeatureId) -> Vec<Cluster> {
        self.inner
            .pyramid
            .read()
            .get_clusters(feature)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn total_features_clustered(&self, zoom: u8) -> usize {
        self.inner.pyramid.read().total_features_clustered(zoom)
    }

    /// Drop clusters inside `bbox` (everything when `None`) and, with
    /// `clear_source`, the source's features too. A malformed `bbox` clears
    /// nothing.
    pub fn clear(&self, bbox: Option<&BoundingBox2D>, clear_source: bool) {
        if let Some(b) = bbox
            && let Err(e) = validate_bbox(b)
        {
            log::warn!("ignoring clear: {}", e);
            return;
        }
        self.inner.clear_clusters(bbox);
        if clear_source {
            self.inner.source.clear(bbox);
        }
    }

    /// Apply a source change. Called automatically for the bound source.
    pub fn handle_source_event(&self, event: &SourceEvent) {
        self.inner.handle_source_event(event);
    }

    pub fn on_refresh<F>(&self, listener: F)
    where
        F: Fn(&RefreshEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.write().push(Arc::new(listener));
    }
}

fn provider_dropped() -> ClusterError {
    ClusterError::Source("cluster provider was dropped".to_string())
}

impl ProviderInner {
    fn is_loaded(&self, source_tile: &Quadkey) -> bool {
        let loaded = self.loaded.read();
        !loaded.is_empty()
            && std::iter::once(source_tile.clone())
                .chain(source_tile.ancestors())
                .any(|q| loaded.contains(&q))
    }

    fn run_job(weak: Weak<ProviderInner>, ticket: JobTicket) -> BoxFuture<'static, Result<()>> {
        async move {
            let load = {
                let inner = weak.upgrade().ok_or_else(provider_dropped)?;
                inner.source.load_tile(&ticket.covering)
            };
            let loaded = load.await;

            let inner = weak.upgrade().ok_or_else(provider_dropped)?;
            let outcome = loaded.map(|tile| inner.ingest(&tile));
            inner.jobs.finish(&ticket);
            outcome
        }
        .boxed()
    }

    /// Cluster a freshly loaded source tile, skipping anything clustered
    /// before.
    fn ingest(&self, tile: &SourceTile) {
        let invalidated = {
            let mut pyramid = self.pyramid.write();
            let dirty = pyramid.grow(&tile.features, true);
            self.loaded.write().insert(tile.quadkey.clone());
            self.invalidate(&dirty)
        };
        log::debug!(
            "clustered source tile {} ({} features)",
            tile.quadkey,
            tile.features.len()
        );
        self.notify(invalidated);
    }

    fn handle_source_event(&self, event: &SourceEvent) {
        match event {
            SourceEvent::FeaturesAdded { features, .. } => {
                self.apply(|pyramid| pyramid.grow(features, false));
            }
            SourceEvent::FeaturesRemoved { features, .. } => {
                self.apply(|pyramid| pyramid.shrink(features));
            }
            SourceEvent::FeaturesUpdated { changes, .. } => {
                self.apply(|pyramid| pyramid.update(changes));
            }
            SourceEvent::TileDestroyed(quadkey) => {
                self.jobs.abort(quadkey);
                self.loaded.write().remove(quadkey);
            }
            SourceEvent::Cleared(bbox) => self.clear_clusters(bbox.as_ref()),
        }
    }

    fn apply<F>(&self, update: F)
    where
        F: FnOnce(&mut ClusterPyramid) -> Vec<(u8, BoundingBox2D)>,
    {
        let invalidated = {
            let mut pyramid = self.pyramid.write();
            let dirty = update(&mut pyramid);
            self.invalidate(&dirty)
        };
        self.notify(invalidated);
    }

    fn clear_clusters(&self, bbox: Option<&BoundingBox2D>) {
        let invalidated = {
            let mut pyramid = self.pyramid.write();
            let dirty = pyramid.clear(bbox);
            self.jobs.abort_within(bbox);

            let mut loaded = self.loaded.write();
            match bbox {
                None => loaded.clear(),
                Some(b) => {
                    let reach = self.eviction_reach(b);
                    loaded.retain(|q| !q.bounds().intersects(&reach));
                }
            }

            let mut removed = self.invalidate(&dirty);
            self.tiles.retain(|quadkey, tile| {
                let stale = bbox.is_none_or(|b| tile.content_bounds.intersects(b));
                if stale {
                    removed.push(quadkey.clone());
                }
                !stale
            });
            removed
        };
        self.notify(invalidated);
    }

    /// Area whose source tiles may hold features evicted by clearing `bbox`.
    ///
    /// A finest-level cluster positioned inside `bbox` can have members up to
    /// two search radii away from its centroid. The latitude half-axis never
    /// exceeds the longitude one, so padding by the latter covers both.
    fn eviction_reach(&self, bbox: &BoundingBox2D) -> BoundingBox2D {
        let ellipse = SearchEllipse::from_pixel_radius(
            &bbox.center(),
            self.config.cluster_radius,
            self.config.tile_size,
            self.config.cluster_max_zoom,
        );
        bbox.pad(2.0 * ellipse.rx, 2.0 * ellipse.rx)
    }

    /// Drop cached tiles overlapping any dirty area of their level.
    fn invalidate(&self, dirty: &[(u8, BoundingBox2D)]) -> Vec<Quadkey> {
        let mut removed = Vec::new();
        if dirty.is_empty() {
            return removed;
        }
        let min_zoom = self.config.min_zoom;
        self.tiles.retain(|quadkey, tile| {
            let level = quadkey.zoom().max(min_zoom);
            let stale = dirty
                .iter()
                .any(|(zoom, bounds)| *zoom == level && tile.content_bounds.intersects(bounds));
            if stale {
                removed.push(quadkey.clone());
            }
            !stale
        });
        removed
    }

    fn notify(&self, tiles: Vec<Quadkey>) {
        if tiles.is_empty() {
            return;
        }
        log::debug!("invalidated {} tiles", tiles.len());
        let event = RefreshEvent {
            features: Vec::new(),
            tiles,
        };
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(&event);
        }
    }

    /// Search the level's store over the tile's content bounds and cache it.
    fn materialize(&self, quadkey: &Quadkey) -> Arc<ClusterTile> {
        let pyramid = self.pyramid.read();
        if let Some(tile) = self.tiles.get(quadkey) {
            return Arc::clone(tile.value());
        }

        let zoom = quadkey.zoom().max(self.config.min_zoom);
        let content_bounds = tile::content_bounds(quadkey, &self.config);
        let mut clusters: Vec<&Cluster> = pyramid
            .store(zoom)
            .map(|store| store.search(&content_bounds))
            .unwrap_or_default();
        clusters.sort_by_key(|c| c.id);

        let tile = Arc::new(ClusterTile {
            quadkey: quadkey.clone(),
            content_bounds,
            features: clusters
                .into_iter()
                .cloned()
                .map(TileFeature::Cluster)
                .collect(),
        });
        self.tiles.insert(quadkey.clone(), Arc::clone(&tile));
        log::trace!("materialized tile {} with {} clusters", quadkey, tile.len());
        tile
    }
}

enum RequestState {
    Ready(Option<Arc<ClusterTile>>),
    Pending(BoxFuture<'static, Result<Arc<ClusterTile>>>),
}

/// Handle returned by [`ClusterProvider::get_tile`].
///
/// Await it for the tile, or check [`TileRequest::ready_tile`] for an
/// immediate answer.
pub struct TileRequest {
    quadkey: Quadkey,
    state: RequestState,
}

impl TileRequest {
    fn ready(quadkey: Quadkey, tile: Arc<ClusterTile>) -> Self {
        Self {
            quadkey,
            state: RequestState::Ready(Some(tile)),
        }
    }

    fn pending(quadkey: Quadkey, future: BoxFuture<'static, Result<Arc<ClusterTile>>>) -> Self {
        Self {
            quadkey,
            state: RequestState::Pending(future),
        }
    }

    pub fn quadkey(&self) -> &Quadkey {
        &self.quadkey
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, RequestState::Ready(Some(_)))
    }

    pub fn ready_tile(&self) -> Option<Arc<ClusterTile>> {
        match &self.state {
            RequestState::Ready(tile) => tile.clone(),
            RequestState::Pending(_) => None,
        }
    }
}

impl fmt::Debug for TileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileRequest")
            .field("quadkey", &self.quadkey)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Future for TileRequest {
    type Output = Result<Arc<ClusterTile>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            RequestState::Ready(tile) => Poll::Ready(tile.take().ok_or_else(|| {
                ClusterError::InvalidInput(format!(
                    "tile request {} polled after completion",
                    this.quadkey
                ))
            })),
            RequestState::Pending(future) => future.poll_unpin(cx),
        }
    }
}
