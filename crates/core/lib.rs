//! Incremental point clustering with lazily materialized quadkey tiles.
//!
//! ## Features
//! - **Per-zoom clusters**: one R*-tree backed store per zoom level, kept up to
//!   date incrementally as features are added, moved and removed
//! - **Cascading updates**: changes at the finest level propagate to every
//!   coarser level as size-weighted centroid shifts
//! - **Screen-space merging**: the merge radius is given in pixels and
//!   converted to an ellipse in longitude/latitude per zoom
//! - **Coalesced tile loads**: concurrent tile requests for one source tile
//!   trigger a single load and a single clustering pass
//! - **Property hooks**: custom per-cluster statistics via [`PropertyAggregator`]
//!
//! ```rust
//! use spatio_cluster::prelude::*;
//! use std::sync::Arc;
//!
//! let source = Arc::new(LocalSource::new(8));
//! let provider = ClusterProvider::builder()
//!     .source(source.clone())
//!     .zoom_range(2, 13)
//!     .cluster_radius(32.0)
//!     .build()?;
//!
//! source.add_features(vec![
//!     Feature::new(1, Point::new(10.0, 10.0)),
//!     Feature::new(2, Point::new(10.0001, 10.0001)),
//!     Feature::new(3, Point::new(50.0, 50.0)),
//! ])?;
//!
//! assert_eq!(provider.total_features_clustered(13), 3);
//! let cluster = provider.get_cluster(&FeatureId::from(1), 13).unwrap();
//! assert_eq!(cluster.size, 2);
//! # Ok::<(), spatio_cluster::ClusterError>(())
//! ```

pub mod builder;
pub mod cluster;
pub mod compute;
pub mod config;
pub mod error;
pub mod hooks;
pub mod provider;
pub mod source;

pub use builder::ClusterProviderBuilder;
pub use cluster::{Cluster, ClusterId, ClusterPyramid, ClusterStore, MemberKey};
pub use config::ClusterConfig;
pub use error::{ClusterError, Result};
pub use hooks::{AggregateOp, DefaultAggregator, FnAggregator, PropertyAggregator};
pub use provider::{ClusterProvider, ClusterTile, RefreshEvent, TileFeature, TileRequest};
pub use source::{LocalSource, SourceEvent, SourceTile, TileSource};

pub use compute::spatial::{RTreeIndex, SearchEllipse, SpatialIndex};
pub use compute::validation;

#[cfg(feature = "geojson")]
pub use compute::geojson;

/// Data types shared with `spatio-cluster-types`.
pub mod types {
    pub use spatio_cluster_types::bbox::BoundingBox2D;
    pub use spatio_cluster_types::feature::{Feature, FeatureId, Properties};
    pub use spatio_cluster_types::projection;
    pub use spatio_cluster_types::quadkey::{Quadkey, QuadkeyError};
}

pub mod prelude {
    pub use crate::types::{BoundingBox2D, Feature, FeatureId, Properties, Quadkey};
    pub use crate::{
        AggregateOp, Cluster, ClusterConfig, ClusterError, ClusterProvider, ClusterTile,
        FnAggregator, LocalSource, PropertyAggregator, RefreshEvent, SourceEvent, TileFeature,
        TileSource,
    };
    pub use geo::Point;
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
