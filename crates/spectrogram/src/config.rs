use std::fmt;
use std::path::Path;

use renderer::RendererConfig;
use sample_scan::PulseScanConfig;
use serde::{Deserialize, Serialize};
use tile_scheduler::TileSchedulerConfig;
use tiles::TileCacheConfig;
use view::ViewDefaults;

/// Every tunable of the engine. Missing sections fall back to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub view: ViewDefaults,
    pub tile_cache: TileCacheConfig,
    pub scheduler: TileSchedulerConfig,
    pub renderer: RendererConfig,
    pub pulse_scan: PulseScanConfig,
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(error) => write!(formatter, "cannot read engine config: {error}"),
            ConfigError::Parse(error) => write!(formatter, "invalid engine config: {error}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(error) => Some(error),
            ConfigError::Parse(error) => Some(error),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        ConfigError::Io(error)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        ConfigError::Parse(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colormap::ColorMapKind;

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("parse empty config");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.tile_cache.capacity, 256);
        assert_eq!(config.scheduler.max_concurrent_fetches, 4);
        assert_eq!(config.pulse_scan.scan_stride, 512);
        assert_eq!(config.view.fft_size, 2048);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "tile_cache": { "capacity": 32 },
                "renderer": { "color_map": "inspectrum" },
                "view": { "power_min": -120.0 }
            }"#,
        )
        .expect("parse partial config");
        assert_eq!(config.tile_cache.capacity, 32);
        assert_eq!(config.renderer.color_map, ColorMapKind::Inspectrum);
        assert_eq!(config.renderer.background, renderer::DEFAULT_BACKGROUND);
        assert_eq!(config.view.power_min, -120.0);
        assert_eq!(config.view.power_max, 0.0);
        assert_eq!(config.scheduler, TileSchedulerConfig::default());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let error = EngineConfig::from_json_str("{ \"tile_cache\": 3 }").unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let error = EngineConfig::load("/nonexistent/spectrogram-engine.json").unwrap_err();
        assert!(matches!(error, ConfigError::Io(_)));
    }
}
