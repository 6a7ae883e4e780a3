//! Cluster records, the per-zoom `ClusterStore`, the grow/shrink
//! aggregation algorithm and the `ClusterPyramid` tying the levels together.

use geo::Point;
use serde::{Deserialize, Serialize};
use spatio_cluster_types::bbox::BoundingBox2D;
use spatio_cluster_types::feature::{
    CLUSTER_SIZE_KEY, FeatureId, IS_CLUSTER_KEY, Properties, ZOOM_KEY,
};
use std::fmt;

pub mod aggregation;
pub mod pyramid;
pub mod store;

pub use aggregation::{ClusterDelta, GrowContext, LevelUpdate, Snapshot, grow, shrink};
pub use pyramid::ClusterPyramid;
pub use store::ClusterStore;

/// Identity of a cluster, unique within its pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u64);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Hands out cluster ids for one pyramid.
#[derive(Debug, Default)]
pub struct ClusterIdGenerator {
    next: u64,
}

impl ClusterIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ClusterId {
        let id = ClusterId(self.next);
        self.next += 1;
        id
    }
}

/// Something merged into a cluster: a source feature at the finest level, or
/// a cluster from the next finer level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKey {
    Feature(FeatureId),
    Cluster(ClusterId),
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feature(id) => write!(f, "feature {}", id),
            Self::Cluster(id) => write!(f, "cluster {}", id),
        }
    }
}

/// An aggregate point summarizing its members at one zoom level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    /// Pyramid level the cluster lives on.
    pub zoom: u8,
    /// Size-weighted centroid of the members.
    pub position: Point,
    /// Leaf features represented.
    pub size: usize,
    /// Direct members in merge order.
    pub members: Vec<MemberKey>,
    /// Hook-maintained properties plus the reserved keys.
    pub properties: Properties,
}

impl Cluster {
    pub(crate) fn new(id: ClusterId, zoom: u8, position: Point, size: usize) -> Self {
        let mut cluster = Self {
            id,
            zoom,
            position,
            size,
            members: Vec::new(),
            properties: Properties::new(),
        };
        cluster.stamp_reserved();
        cluster
    }

    /// Write the engine-owned keys into `properties`.
    pub(crate) fn stamp_reserved(&mut self) {
        self.properties
            .insert(IS_CLUSTER_KEY.to_string(), serde_json::Value::Bool(true));
        self.properties
            .insert(CLUSTER_SIZE_KEY.to_string(), self.size.into());
        self.properties
            .insert(ZOOM_KEY.to_string(), self.zoom.into());
    }

    pub fn bbox(&self) -> BoundingBox2D {
        BoundingBox2D::from_point(&self.position)
    }

    pub fn member_key(&self) -> MemberKey {
        MemberKey::Cluster(self.id)
    }
}
