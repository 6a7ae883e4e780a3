pub mod ellipse;
pub use ellipse::SearchEllipse;

pub mod rtree;
pub use rtree::{IndexEntry, RTreeIndex, SpatialIndex};
