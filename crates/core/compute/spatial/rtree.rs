//! Spatial index over cluster positions.
//!
//! `SpatialIndex` is the capability a `ClusterStore` needs from its index:
//! bulk load, insert, remove, box search, enumerate, and (optionally scoped)
//! clear. `RTreeIndex` implements it with an R*-tree.
//!
//! # Example
//!
//! ```rust
//! use spatio_cluster::compute::spatial::{IndexEntry, RTreeIndex, SpatialIndex};
//! use spatio_cluster_types::bbox::BoundingBox2D;
//!
//! let mut index = RTreeIndex::default();
//! index.insert(IndexEntry::new(0, 10.0, 10.0));
//! index.insert(IndexEntry::new(1, 50.0, 50.0));
//!
//! let hits = index.search(&BoundingBox2D::new(0.0, 0.0, 20.0, 20.0));
//! assert_eq!(hits, vec![IndexEntry::new(0, 10.0, 10.0)]);
//! ```

use rstar::{AABB, RTree, RTreeObject};
use spatio_cluster_types::bbox::BoundingBox2D;

/// A cluster slot positioned at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub slot: usize,
    pub x: f64,
    pub y: f64,
}

impl IndexEntry {
    pub fn new(slot: usize, x: f64, y: f64) -> Self {
        Self { slot, x, y }
    }
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

/// Mutable bounding-box index.
///
/// Implementations never fail: searching an empty index, or removing an
/// entry that is not present, simply yields nothing.
pub trait SpatialIndex: Default + Send {
    /// Replace the contents with `entries`.
    fn load(&mut self, entries: Vec<IndexEntry>);

    fn insert(&mut self, entry: IndexEntry);

    /// Remove an exact entry. Returns whether it was present.
    fn remove(&mut self, entry: &IndexEntry) -> bool;

    /// Entries intersecting `bbox`.
    fn search(&self, bbox: &BoundingBox2D) -> Vec<IndexEntry>;

    fn all(&self) -> Vec<IndexEntry>;

    /// Remove entries inside `bbox`, or everything when `bbox` is `None`.
    /// Returns the evicted entries.
    fn clear(&mut self, bbox: Option<&BoundingBox2D>) -> Vec<IndexEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// R*-tree backed `SpatialIndex`.
#[derive(Debug, Default)]
pub struct RTreeIndex {
    tree: RTree<IndexEntry>,
}

impl RTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[inline]
fn envelope_of(bbox: &BoundingBox2D) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.min_x(), bbox.min_y()], [bbox.max_x(), bbox.max_y()])
}

impl SpatialIndex for RTreeIndex {
    fn load(&mut self, entries: Vec<IndexEntry>) {
        self.tree = RTree::bulk_load(entries);
    }

    fn insert(&mut self, entry: IndexEntry) {
        self.tree.insert(entry);
    }

    fn remove(&mut self, entry: &IndexEntry) -> bool {
        self.tree.remove(entry).is_some()
    }

    /// - Returns empty result if coordinates are non-finite.
    fn search(&self, bbox: &BoundingBox2D) -> Vec<IndexEntry> {
        if !bbox.is_finite() {
            log::warn!("Rejecting bounding box search with non-finite coordinates");
            return Vec::new();
        }

        self.tree
            .locate_in_envelope_intersecting(&envelope_of(bbox))
            .copied()
            .collect()
    }

    fn all(&self) -> Vec<IndexEntry> {
        self.tree.iter().copied().collect()
    }

    fn clear(&mut self, bbox: Option<&BoundingBox2D>) -> Vec<IndexEntry> {
        let Some(bbox) = bbox else {
            let evicted = self.all();
            self.tree = RTree::new();
            return evicted;
        };

        if !bbox.is_finite() {
            log::warn!("Rejecting bounding box clear with non-finite coordinates");
            return Vec::new();
        }

        let evicted: Vec<IndexEntry> = self
            .tree
            .locate_in_envelope(&envelope_of(bbox))
            .copied()
            .collect();
        for entry in &evicted {
            self.tree.remove(entry);
        }
        evicted
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RTreeIndex {
        let mut index = RTreeIndex::new();
        index.load(vec![
            IndexEntry::new(0, 0.0, 0.0),
            IndexEntry::new(1, 5.0, 5.0),
            IndexEntry::new(2, 20.0, 20.0),
        ]);
        index
    }

    #[test]
    fn test_bulk_load_and_search() {
        let index = sample();
        assert_eq!(index.len(), 3);

        let mut hits: Vec<_> = index
            .search(&BoundingBox2D::new(-1.0, -1.0, 6.0, 6.0))
            .into_iter()
            .map(|e| e.slot)
            .collect();
        hits.sort();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn test_remove_is_exact() {
        let mut index = sample();
        assert!(!index.remove(&IndexEntry::new(1, 5.0, 5.1)));
        assert!(index.remove(&IndexEntry::new(1, 5.0, 5.0)));
        assert!(!index.remove(&IndexEntry::new(1, 5.0, 5.0)));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_empty_index_never_fails() {
        let index = RTreeIndex::new();
        assert!(index.is_empty());
        assert!(index.all().is_empty());
        assert!(index.search(&BoundingBox2D::new(0.0, 0.0, 1.0, 1.0)).is_empty());
    }

    #[test]
    fn test_non_finite_search_is_rejected() {
        let index = sample();
        let bbox = BoundingBox2D::new(f64::NAN, 0.0, 1.0, 1.0);
        assert!(index.search(&bbox).is_empty());
    }

    #[test]
    fn test_scoped_clear() {
        let mut index = sample();
        let evicted = index.clear(Some(&BoundingBox2D::new(-1.0, -1.0, 6.0, 6.0)));
        assert_eq!(evicted.len(), 2);
        assert_eq!(index.all(), vec![IndexEntry::new(2, 20.0, 20.0)]);

        let rest = index.clear(None);
        assert_eq!(rest.len(), 1);
        assert!(index.is_empty());
    }
}
