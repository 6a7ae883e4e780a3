//! Error types for the clustering engine.

use spatio_cluster_types::quadkey::{Quadkey, QuadkeyError};

/// Errors surfaced by the public API.
///
/// Internal inconsistencies (unknown ids, missing associations) are never
/// reported here; they are treated as no-ops.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClusterError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Quadkey(#[from] QuadkeyError),

    /// The covering source tile was evicted while a load was pending.
    #[error("Tile {0} was evicted before its load completed")]
    TileEvicted(Quadkey),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
