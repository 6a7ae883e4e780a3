//! Spatial indexing, ellipse search, validation, and GeoJSON ingestion.

#[cfg(feature = "geojson")]
pub mod geojson;
pub mod spatial;
pub mod validation;
