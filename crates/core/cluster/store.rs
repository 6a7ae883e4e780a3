//! Per-zoom cluster storage.
//!
//! Clusters live in an arena of slots. The spatial index holds one entry per
//! live slot at the cluster's current position, and the association table
//! maps each member (input-level feature or cluster) to the slot of the
//! cluster it currently belongs to.

use crate::cluster::{Cluster, MemberKey};
use crate::compute::spatial::{IndexEntry, RTreeIndex, SpatialIndex};
use geo::Point;
use rustc_hash::FxHashMap;
use spatio_cluster_types::bbox::BoundingBox2D;

/// Cluster records for a single zoom level.
#[derive(Debug)]
pub struct ClusterStore<I: SpatialIndex = RTreeIndex> {
    zoom: u8,
    slots: Vec<Option<Cluster>>,
    free: Vec<usize>,
    index: I,
    association: FxHashMap<MemberKey, usize>,
}

impl<I: SpatialIndex> ClusterStore<I> {
    pub fn new(zoom: u8) -> Self {
        Self {
            zoom,
            slots: Vec::new(),
            free: Vec::new(),
            index: I::default(),
            association: FxHashMap::default(),
        }
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Store `cluster` and index it at its position. Returns its slot.
    pub fn add_cluster(&mut self, cluster: Cluster) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.index.insert(IndexEntry::new(
            slot,
            cluster.position.x(),
            cluster.position.y(),
        ));
        self.slots[slot] = Some(cluster);
        slot
    }

    /// Drop the cluster in `slot` from the index and the arena.
    ///
    /// Associations pointing at the slot are left to the caller.
    pub fn remove_cluster(&mut self, slot: usize) -> Option<Cluster> {
        let cluster = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&IndexEntry::new(
            slot,
            cluster.position.x(),
            cluster.position.y(),
        ));
        self.free.push(slot);
        Some(cluster)
    }

    pub fn cluster(&self, slot: usize) -> Option<&Cluster> {
        self.slots.get(slot)?.as_ref()
    }

    pub(crate) fn cluster_mut(&mut self, slot: usize) -> Option<&mut Cluster> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Cluster that `key` currently belongs to.
    pub fn get_cluster(&self, key: &MemberKey) -> Option<&Cluster> {
        self.cluster(*self.association.get(key)?)
    }

    pub fn cluster_slot(&self, key: &MemberKey) -> Option<usize> {
        self.association.get(key).copied()
    }

    /// Record `key` as a member of the cluster in `slot`. Index untouched.
    pub fn set_cluster(&mut self, key: MemberKey, slot: usize) {
        self.association.insert(key, slot);
    }

    /// Forget the association of `key`. Index untouched.
    pub fn remove_from_cluster(&mut self, key: &MemberKey) -> Option<usize> {
        self.association.remove(key)
    }

    /// Move the cluster in `slot` to `position`, keeping the index in sync.
    pub fn relocate(&mut self, slot: usize, position: Point) {
        let Some(cluster) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        if cluster.position == position {
            return;
        }
        self.index.remove(&IndexEntry::new(
            slot,
            cluster.position.x(),
            cluster.position.y(),
        ));
        cluster.position = position;
        self.index
            .insert(IndexEntry::new(slot, position.x(), position.y()));
    }

    /// Slots of clusters whose position falls in `bbox`.
    pub fn search_slots(&self, bbox: &BoundingBox2D) -> Vec<usize> {
        self.index.search(bbox).into_iter().map(|e| e.slot).collect()
    }

    /// Clusters whose position falls in `bbox`.
    pub fn search(&self, bbox: &BoundingBox2D) -> Vec<&Cluster> {
        self.index
            .search(bbox)
            .into_iter()
            .filter_map(|e| self.cluster(e.slot))
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Cluster> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sum of cluster sizes: the number of leaf features clustered here.
    pub fn total_size(&self) -> usize {
        self.all().map(|c| c.size).sum()
    }

    pub fn association_count(&self) -> usize {
        self.association.len()
    }

    /// Evict clusters positioned inside `bbox` along with every association
    /// pointing at them, or wipe the level when `bbox` is `None`.
    ///
    /// Returns the evicted clusters.
    pub fn clear(&mut self, bbox: Option<&BoundingBox2D>) -> Vec<Cluster> {
        if bbox.is_none() {
            self.index.clear(None);
            self.association.clear();
            self.free.clear();
            return self.slots.drain(..).flatten().collect();
        }

        let evicted = self.index.clear(bbox);
        let mut removed = Vec::with_capacity(evicted.len());
        for entry in evicted {
            if let Some(cluster) = self.slots.get_mut(entry.slot).and_then(Option::take) {
                for member in &cluster.members {
                    if self.association.get(member) == Some(&entry.slot) {
                        self.association.remove(member);
                    }
                }
                self.free.push(entry.slot);
                removed.push(cluster);
            }
        }
        removed
    }
}
