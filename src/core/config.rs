//! Configuration for tile layers
//!
//! A [`TileLayerConfig`] carries every tunable of the engine: zoom limits,
//! concurrency budget, cache bounds and URL mirror policy. Configs can be
//! built in code, resolved from a [`TileLoadingProfile`] preset or read from
//! JSON.

use crate::core::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_MAX_REQUESTS, DEFAULT_USER_AGENT,
    MAX_SUPPORTED_ZOOM,
};
use crate::core::geo::LatLngBounds;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How a URL is picked when a source has several mirror templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorSelection {
    /// Rotate through mirrors request by request
    #[default]
    RoundRobin,
    /// `(x + y) % mirrors`, so a tile always maps to the same host
    ByCoordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayerConfig {
    /// Maximum simultaneous in-flight fetches
    pub max_requests: usize,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Edge length of one tile image in pixels
    pub tile_size: u32,
    /// Added to the viewport zoom before rounding; `-1` fetches coarser tiles
    pub zoom_offset: i32,
    /// Extra tiles requested around the visible area, per side
    pub prefetch_margin: f64,
    /// Maximum number of cached tiles
    pub cache_capacity: usize,
    /// Optional bound on the summed payload size of cached tiles
    pub max_cache_bytes: Option<usize>,
    /// Tiles entirely outside this box are never requested
    pub extent: Option<LatLngBounds>,
    /// Wrap columns around the antimeridian instead of dropping them
    pub wrap_longitude: bool,
    pub mirror_selection: MirrorSelection,
    pub fetch_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for TileLayerConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            min_zoom: 0,
            max_zoom: 19,
            tile_size: 256,
            zoom_offset: 0,
            prefetch_margin: 0.0,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_cache_bytes: None,
            extent: None,
            wrap_longitude: true,
            mirror_selection: MirrorSelection::RoundRobin,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl TileLayerConfig {
    /// Standard-resolution screens fetch one zoom level coarser, so a 256px
    /// tile covers 512 device pixels, matching what high-DPI screens get.
    pub fn for_pixel_ratio(device_pixel_ratio: f64) -> Self {
        let zoom_offset = if device_pixel_ratio <= 1.0 { -1 } else { 0 };
        Self {
            zoom_offset,
            ..Self::default()
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Rejects configurations the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::Config("max_requests must be at least 1".into()));
        }
        if !self.tile_size.is_power_of_two() || self.tile_size < 16 {
            return Err(Error::Config(format!(
                "tile_size must be a power of two >= 16, got {}",
                self.tile_size
            )));
        }
        if self.min_zoom > self.max_zoom {
            return Err(Error::Config(format!(
                "min_zoom {} exceeds max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(Error::Config(format!(
                "max_zoom {} exceeds supported maximum {}",
                self.max_zoom, MAX_SUPPORTED_ZOOM
            )));
        }
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be at least 1".into()));
        }
        if self.max_cache_bytes == Some(0) {
            return Err(Error::Config("max_cache_bytes must be positive".into()));
        }
        if !self.prefetch_margin.is_finite() || self.prefetch_margin < 0.0 {
            return Err(Error::Config(format!(
                "prefetch_margin must be a non-negative number, got {}",
                self.prefetch_margin
            )));
        }
        if let Some(extent) = &self.extent {
            if extent.south() > extent.north() || extent.west() > extent.east() {
                return Err(Error::Config("extent is inverted".into()));
            }
        }
        Ok(())
    }

    /// Parses and validates a JSON document; missing keys take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Presets for common deployment situations
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TileLoadingProfile {
    #[default]
    Balanced,
    /// Few connections, small cache
    LowResource,
    /// HTTP/2 servers that tolerate many parallel requests
    HighPerformance,
    Custom(TileLayerConfig),
}

impl TileLoadingProfile {
    pub fn resolve(&self) -> TileLayerConfig {
        match self {
            Self::Balanced => TileLayerConfig::default(),
            Self::LowResource => TileLayerConfig {
                max_requests: 2,
                cache_capacity: 64,
                max_cache_bytes: Some(16 * 1024 * 1024),
                ..TileLayerConfig::default()
            },
            Self::HighPerformance => TileLayerConfig {
                max_requests: 20,
                prefetch_margin: 1.0,
                cache_capacity: 1024,
                ..TileLayerConfig::default()
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TileLayerConfig::default().validate().is_ok());
        for profile in [
            TileLoadingProfile::Balanced,
            TileLoadingProfile::LowResource,
            TileLoadingProfile::HighPerformance,
        ] {
            assert!(profile.resolve().validate().is_ok(), "{:?}", profile);
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            TileLayerConfig { max_requests: 0, ..Default::default() },
            TileLayerConfig { tile_size: 300, ..Default::default() },
            TileLayerConfig { min_zoom: 10, max_zoom: 5, ..Default::default() },
            TileLayerConfig { max_zoom: 30, ..Default::default() },
            TileLayerConfig { cache_capacity: 0, ..Default::default() },
            TileLayerConfig { prefetch_margin: -1.0, ..Default::default() },
            TileLayerConfig { prefetch_margin: f64::NAN, ..Default::default() },
            TileLayerConfig {
                extent: Some(LatLngBounds::from_coords(10.0, 0.0, -10.0, 5.0)),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{:?}", config);
        }
    }

    #[test]
    fn test_pixel_ratio_offset() {
        assert_eq!(TileLayerConfig::for_pixel_ratio(1.0).zoom_offset, -1);
        assert_eq!(TileLayerConfig::for_pixel_ratio(2.0).zoom_offset, 0);
    }

    #[test]
    fn test_from_json_partial() {
        let config = TileLayerConfig::from_json_str(
            r#"{ "max_requests": 20, "max_zoom": 19, "mirror_selection": "by_coordinate" }"#,
        )
        .unwrap();
        assert_eq!(config.max_requests, 20);
        assert_eq!(config.tile_size, 256);
        assert_eq!(config.mirror_selection, MirrorSelection::ByCoordinate);

        assert!(matches!(
            TileLayerConfig::from_json_str(r#"{ "max_requests": 0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            TileLayerConfig::from_json_str("not json"),
            Err(Error::Serialization(_))
        ));
    }
}
