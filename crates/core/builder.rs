//! Builder for cluster providers
//!
//! Collects the source, configuration and property hooks before wiring a
//! [`ClusterProvider`] to its source.

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::hooks::{DefaultAggregator, PropertyAggregator};
use crate::provider::ClusterProvider;
use crate::source::TileSource;
use std::fmt;
use std::sync::Arc;

/// Builder for a [`ClusterProvider`].
pub struct ClusterProviderBuilder {
    source: Option<Arc<dyn TileSource>>,
    config: ClusterConfig,
    hooks: Arc<dyn PropertyAggregator>,
}

impl fmt::Debug for ClusterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterProviderBuilder")
            .field("has_source", &self.source.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ClusterProviderBuilder {
    /// Create a builder with the default configuration and inert hooks.
    pub fn new() -> Self {
        Self {
            source: None,
            config: ClusterConfig::default(),
            hooks: Arc::new(DefaultAggregator),
        }
    }

    /// Set the feature source. Required.
    pub fn source(mut self, source: Arc<dyn TileSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClusterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the merge radius in pixels.
    pub fn cluster_radius(mut self, radius: f64) -> Self {
        self.config.cluster_radius = radius;
        self
    }

    /// Set the clustered zoom range.
    pub fn zoom_range(mut self, min_zoom: u8, cluster_max_zoom: u8) -> Self {
        self.config.min_zoom = min_zoom;
        self.config.cluster_max_zoom = cluster_max_zoom;
        self
    }

    pub fn tile_size(mut self, tile_size: u32) -> Self {
        self.config.tile_size = tile_size;
        self
    }

    pub fn tile_margin(mut self, margin: f64) -> Self {
        self.config.tile_margin = margin;
        self
    }

    /// Set the property aggregation hooks.
    pub fn hooks(mut self, hooks: Arc<dyn PropertyAggregator>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Build the provider. Fails without a source or with an invalid
    /// configuration.
    pub fn build(self) -> Result<ClusterProvider> {
        let source = self
            .source
            .ok_or_else(|| ClusterError::InvalidConfig("a tile source is required".to_string()))?;
        ClusterProvider::with_hooks(source, self.config, self.hooks)
    }
}

impl Default for ClusterProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
