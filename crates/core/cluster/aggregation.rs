//! Incremental grow/shrink of one pyramid level.
//!
//! A level consumes a batch of [`ClusterDelta`]s describing how its inputs
//! changed (a source feature at the finest level, a finer cluster elsewhere)
//! and produces the deltas of its own clusters for the next coarser level.
//!
//! Positions are maintained as size-weighted centroids: adding a member of
//! size `s` at `p` to a cluster of size `S` at `P` moves it to
//! `(S*P + s*p) / (S + s)`, and removal applies the inverse.

use crate::cluster::store::ClusterStore;
use crate::cluster::{Cluster, ClusterId, ClusterIdGenerator, MemberKey};
use crate::compute::spatial::{SearchEllipse, SpatialIndex};
use crate::config::ClusterConfig;
use crate::hooks::{AggregateOp, PropertyAggregator};
use geo::Point;
use rustc_hash::FxHashMap;
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::feature::{Feature, Properties};
use std::cmp::Ordering;

/// State of an input at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub position: Point,
    pub size: usize,
    pub properties: Properties,
}

impl Snapshot {
    pub fn of_feature(feature: &Feature) -> Self {
        Self {
            position: feature.point,
            size: 1,
            properties: feature.properties.clone(),
        }
    }

    pub fn of_cluster(cluster: &Cluster) -> Self {
        Self {
            position: cluster.position,
            size: cluster.size,
            properties: cluster.properties.clone(),
        }
    }
}

/// How one input changed during an update pass.
///
/// `before == None` is a new input, `after == None` a removed one, and both
/// present a changed one.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterDelta {
    pub key: MemberKey,
    pub before: Option<Snapshot>,
    pub after: Option<Snapshot>,
}

impl ClusterDelta {
    pub fn added(feature: &Feature) -> Self {
        Self {
            key: MemberKey::Feature(feature.id.clone()),
            before: None,
            after: Some(Snapshot::of_feature(feature)),
        }
    }

    pub fn removed(feature: &Feature) -> Self {
        Self {
            key: MemberKey::Feature(feature.id.clone()),
            before: Some(Snapshot::of_feature(feature)),
            after: None,
        }
    }

    /// A cluster leaving the level it lived on.
    pub fn dissolved(cluster: &Cluster) -> Self {
        Self {
            key: cluster.member_key(),
            before: Some(Snapshot::of_cluster(cluster)),
            after: None,
        }
    }

    fn anchor(&self) -> Option<Point> {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(|s| s.position)
    }
}

/// Result of updating one level.
#[derive(Debug, Clone, Default)]
pub struct LevelUpdate {
    /// Area covering every touched cluster before and after the pass.
    pub bounds: Option<BoundingBox2D>,
    /// Changes of this level's clusters, in first-touch order.
    pub deltas: Vec<ClusterDelta>,
}

/// Everything a level update needs besides the store and the batch.
pub struct GrowContext<'a> {
    pub zoom: u8,
    pub config: &'a ClusterConfig,
    pub hooks: &'a dyn PropertyAggregator,
    pub ids: &'a mut ClusterIdGenerator,
    /// Skip inputs that already have an association at this level.
    pub drop_duplicates: bool,
}

/// Grow clusters at one level with a batch of new or changed inputs.
///
/// Already-associated inputs are skipped when `drop_duplicates` is set;
/// otherwise a changed input shifts its cluster's size and centroid in place.
/// New inputs merge into the nearest existing cluster whose position lies in
/// the search ellipse, or seed a new cluster.
pub fn grow<I: SpatialIndex>(
    store: &mut ClusterStore<I>,
    batch: &[ClusterDelta],
    ctx: &mut GrowContext<'_>,
) -> LevelUpdate {
    let Some(anchor) = batch.first().and_then(ClusterDelta::anchor) else {
        return LevelUpdate::default();
    };
    let ellipse = SearchEllipse::from_pixel_radius(
        &anchor,
        ctx.config.cluster_radius,
        ctx.config.tile_size,
        ctx.zoom,
    );

    let mut pass = Pass::default();
    for delta in batch {
        match store.cluster_slot(&delta.key) {
            Some(_) if ctx.drop_duplicates => {
                log::trace!("zoom {}: dropping duplicate {}", ctx.zoom, delta.key);
            }
            Some(slot) => apply_existing(store, slot, delta, ctx, &mut pass),
            None => match &delta.after {
                Some(after) => merge_or_create(store, &delta.key, after, &ellipse, ctx, &mut pass),
                None => log::trace!("zoom {}: {} is not clustered", ctx.zoom, delta.key),
            },
        }
    }

    let update = pass.finish(store);
    log::debug!(
        "zoom {}: grew with {} inputs, {} clusters touched",
        ctx.zoom,
        batch.len(),
        update.deltas.len()
    );
    update
}

/// Shrink clusters at one level with a batch of removed or changed inputs.
///
/// Removed inputs are spliced out of their cluster; a cluster whose size
/// drops to zero is destroyed. Inputs without an association are ignored.
pub fn shrink<I: SpatialIndex>(
    store: &mut ClusterStore<I>,
    batch: &[ClusterDelta],
    ctx: &mut GrowContext<'_>,
) -> LevelUpdate {
    let mut pass = Pass::default();
    for delta in batch {
        match store.cluster_slot(&delta.key) {
            Some(slot) => apply_existing(store, slot, delta, ctx, &mut pass),
            None => log::trace!("zoom {}: {} is not clustered", ctx.zoom, delta.key),
        }
    }

    let update = pass.finish(store);
    log::debug!(
        "zoom {}: shrank with {} inputs, {} clusters touched",
        ctx.zoom,
        batch.len(),
        update.deltas.len()
    );
    update
}

/// Clusters touched during one level pass.
#[derive(Default)]
struct Pass {
    order: Vec<ClusterId>,
    touched: FxHashMap<ClusterId, (usize, Option<Snapshot>)>,
    bounds: Option<BoundingBox2D>,
}

impl Pass {
    /// Remember the cluster's pre-pass state on first touch.
    fn touch(&mut self, cluster: &Cluster, slot: usize, existed: bool) {
        if !self.touched.contains_key(&cluster.id) {
            let before = existed.then(|| Snapshot::of_cluster(cluster));
            self.touched.insert(cluster.id, (slot, before));
            self.order.push(cluster.id);
        }
    }

    fn cover(&mut self, point: &Point) {
        match &mut self.bounds {
            Some(bounds) => bounds.extend_point(point),
            None => self.bounds = Some(BoundingBox2D::from_point(point)),
        }
    }

    fn finish<I: SpatialIndex>(mut self, store: &ClusterStore<I>) -> LevelUpdate {
        let mut deltas = Vec::with_capacity(self.order.len());
        for id in self.order {
            let Some((slot, before)) = self.touched.remove(&id) else {
                continue;
            };
            let after = store
                .cluster(slot)
                .filter(|c| c.id == id)
                .map(Snapshot::of_cluster);
            if before.is_none() && after.is_none() {
                continue;
            }
            deltas.push(ClusterDelta {
                key: MemberKey::Cluster(id),
                before,
                after,
            });
        }
        LevelUpdate {
            bounds: self.bounds,
            deltas,
        }
    }
}

/// Weighted centroid after taking `remove` out and putting `add` in.
fn shift(
    cluster: &Cluster,
    remove: Option<&Snapshot>,
    add: Option<&Snapshot>,
) -> (Point, usize) {
    let mut weight = cluster.size as f64;
    let mut x = cluster.position.x() * weight;
    let mut y = cluster.position.y() * weight;
    let mut size = cluster.size;

    if let Some(r) = remove {
        let w = r.size as f64;
        x -= r.position.x() * w;
        y -= r.position.y() * w;
        weight -= w;
        size = size.saturating_sub(r.size);
    }
    if let Some(a) = add {
        let w = a.size as f64;
        x += a.position.x() * w;
        y += a.position.y() * w;
        weight += w;
        size += a.size;
    }

    if size == 0 || weight <= 0.0 {
        return (cluster.position, size);
    }
    (Point::new(x / weight, y / weight), size)
}

/// Apply a delta to the cluster its key already belongs to.
fn apply_existing<I: SpatialIndex>(
    store: &mut ClusterStore<I>,
    slot: usize,
    delta: &ClusterDelta,
    ctx: &GrowContext<'_>,
    pass: &mut Pass,
) {
    let Some(cluster) = store.cluster(slot) else {
        store.remove_from_cluster(&delta.key);
        return;
    };

    let before = match (&delta.before, &delta.after) {
        (Some(before), _) => before,
        (None, _) => {
            log::trace!("zoom {}: {} already clustered", ctx.zoom, delta.key);
            return;
        }
    };

    pass.touch(cluster, slot, true);
    let prior = cluster.position;
    pass.cover(&prior);
    let (position, size) = shift(cluster, Some(before), delta.after.as_ref());

    if delta.after.is_none() {
        store.remove_from_cluster(&delta.key);
    }

    if size == 0 {
        destroy(store, slot);
        log::trace!("zoom {}: destroyed cluster at slot {}", ctx.zoom, slot);
        return;
    }

    let Some(cluster) = store.cluster_mut(slot) else {
        return;
    };
    cluster.size = size;
    ctx.hooks
        .aggregate_properties(&mut cluster.properties, &before.properties, AggregateOp::Remove);
    match &delta.after {
        Some(after) => ctx.hooks.aggregate_properties(
            &mut cluster.properties,
            &after.properties,
            AggregateOp::Add,
        ),
        None => {
            if let Some(idx) = cluster.members.iter().position(|m| m == &delta.key) {
                cluster.members.remove(idx);
            }
        }
    }
    cluster.stamp_reserved();
    store.relocate(slot, position);
    pass.cover(&position);
}

/// Remove an emptied cluster together with any associations still pointing at it.
fn destroy<I: SpatialIndex>(store: &mut ClusterStore<I>, slot: usize) {
    if let Some(cluster) = store.remove_cluster(slot) {
        for member in &cluster.members {
            if store.cluster_slot(member) == Some(slot) {
                store.remove_from_cluster(member);
            }
        }
    }
}

fn merge_or_create<I: SpatialIndex>(
    store: &mut ClusterStore<I>,
    key: &MemberKey,
    after: &Snapshot,
    ellipse: &SearchEllipse,
    ctx: &mut GrowContext<'_>,
    pass: &mut Pass,
) {
    let nearest = store
        .search_slots(&ellipse.envelope(&after.position))
        .into_iter()
        .filter_map(|slot| {
            let cluster = store.cluster(slot)?;
            let d = ellipse.normalized_distance(&after.position, &cluster.position);
            (d <= 1.0).then_some((slot, d))
        })
        .min_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        })
        .map(|(slot, _)| slot);

    let slot = match nearest.and_then(|slot| store.cluster(slot).map(|c| (slot, c))) {
        Some((slot, cluster)) => {
            pass.touch(cluster, slot, true);
            pass.cover(&cluster.position);
            pass.cover(&after.position);
            let (position, size) = shift(cluster, None, Some(after));

            if let Some(cluster) = store.cluster_mut(slot) {
                cluster.members.push(key.clone());
                cluster.size = size;
                ctx.hooks.aggregate_properties(
                    &mut cluster.properties,
                    &after.properties,
                    AggregateOp::Add,
                );
                cluster.stamp_reserved();
            }
            store.relocate(slot, position);
            pass.cover(&position);
            log::trace!("zoom {}: merged {} into slot {}", ctx.zoom, key, slot);
            slot
        }
        None => {
            let mut cluster = Cluster::new(ctx.ids.next_id(), ctx.zoom, after.position, after.size);
            cluster.properties = ctx.hooks.create_properties(&after.properties);
            cluster.members.push(key.clone());
            cluster.stamp_reserved();

            let slot = store.add_cluster(cluster);
            if let Some(cluster) = store.cluster(slot) {
                pass.touch(cluster, slot, false);
            }
            pass.cover(&after.position);
            log::trace!("zoom {}: {} seeded slot {}", ctx.zoom, key, slot);
            slot
        }
    };

    store.set_cluster(key.clone(), slot);
}
