//! Clustering configuration.
//!
//! All fields have serde defaults, so a partial JSON/TOML document only needs
//! to name the settings it overrides.

use serde::de::Error;
use spatio_cluster_types::quadkey::MAX_ZOOM;

/// Settings for a cluster pyramid.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Merge distance in screen pixels at each zoom level.
    #[serde(default = "ClusterConfig::default_cluster_radius")]
    pub cluster_radius: f64,

    /// Coarsest clustered zoom level.
    #[serde(default = "ClusterConfig::default_min_zoom")]
    pub min_zoom: u8,

    /// Finest clustered zoom level. Tiles deeper than this are served raw.
    #[serde(default = "ClusterConfig::default_cluster_max_zoom")]
    pub cluster_max_zoom: u8,

    /// Edge length of a tile in pixels, used to convert the radius into degrees.
    #[serde(default = "ClusterConfig::default_tile_size")]
    pub tile_size: u32,

    /// Extra pixels around each tile when materializing its clusters.
    #[serde(default)]
    pub tile_margin: f64,
}

impl ClusterConfig {
    const fn default_cluster_radius() -> f64 {
        32.0
    }

    const fn default_min_zoom() -> u8 {
        2
    }

    const fn default_cluster_max_zoom() -> u8 {
        13
    }

    const fn default_tile_size() -> u32 {
        256
    }

    pub fn with_cluster_radius(mut self, radius: f64) -> Self {
        assert!(
            radius.is_finite() && radius > 0.0,
            "Cluster radius must be positive and finite"
        );
        self.cluster_radius = radius;
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, cluster_max_zoom: u8) -> Self {
        assert!(
            min_zoom <= cluster_max_zoom,
            "min_zoom must not exceed cluster_max_zoom"
        );
        self.min_zoom = min_zoom;
        self.cluster_max_zoom = cluster_max_zoom;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        assert!(tile_size > 0, "Tile size must be greater than zero");
        self.tile_size = tile_size;
        self
    }

    pub fn with_tile_margin(mut self, margin: f64) -> Self {
        self.tile_margin = margin;
        self
    }

    /// Number of pyramid levels.
    pub fn levels(&self) -> usize {
        (self.cluster_max_zoom - self.min_zoom) as usize + 1
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.cluster_radius.is_finite() || self.cluster_radius <= 0.0 {
            return Err(format!(
                "Cluster radius must be positive and finite, got {}",
                self.cluster_radius
            ));
        }

        if self.min_zoom > self.cluster_max_zoom {
            return Err(format!(
                "min_zoom ({}) must not exceed cluster_max_zoom ({})",
                self.min_zoom, self.cluster_max_zoom
            ));
        }

        if self.cluster_max_zoom > MAX_ZOOM {
            return Err(format!(
                "cluster_max_zoom ({}) exceeds the maximum zoom {}",
                self.cluster_max_zoom, MAX_ZOOM
            ));
        }

        if self.tile_size == 0 {
            return Err("Tile size must be greater than zero".to_string());
        }

        if !self.tile_margin.is_finite() || self.tile_margin < 0.0 {
            return Err(format!(
                "Tile margin must be finite and non-negative, got {}",
                self.tile_margin
            ));
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: ClusterConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: ClusterConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_radius: Self::default_cluster_radius(),
            min_zoom: Self::default_min_zoom(),
            cluster_max_zoom: Self::default_cluster_max_zoom(),
            tile_size: Self::default_tile_size(),
            tile_margin: 0.0,
        }
    }
}
