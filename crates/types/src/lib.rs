//! # spatio-cluster-types
//!
//! Core data types for the spatio-cluster engine.
//!
//! - **Features**: `Feature`, `FeatureId`, `Properties`
//! - **Bounding boxes**: `BoundingBox2D`
//! - **Tiles**: `Quadkey` addressing and Web Mercator pixel math
//!
//! All types are serializable with Serde and built on top of the `geo` crate's
//! geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use spatio_cluster_types::bbox::BoundingBox2D;
//! use spatio_cluster_types::feature::Feature;
//! use spatio_cluster_types::quadkey::Quadkey;
//! use geo::Point;
//!
//! let cafe = Feature::new("cafe-1", Point::new(-74.0060, 40.7128));
//! let tile = Quadkey::covering(&cafe.point, 12).unwrap();
//! assert!(tile.bounds().contains_point(&cafe.point));
//!
//! let manhattan = BoundingBox2D::new(-74.0479, 40.6829, -73.9067, 40.8820);
//! assert!(manhattan.contains_point(&cafe.point));
//! ```

pub mod bbox;
pub mod feature;
pub mod projection;
pub mod quadkey;
