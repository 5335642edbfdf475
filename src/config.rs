//! Engine configuration, loaded from TOML.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [history]
//! max_steps = 50
//! max_memory_mb = 100
//!
//! [quick_mask]
//! color = [255, 0, 0, 128]
//! inverted = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::canvas::Interpolation;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history: HistoryConfig,
    pub quick_mask: QuickMaskConfig,
    pub selection: SelectionConfig,
    pub transform: TransformConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_steps: usize,
    /// `0` disables the memory cap.
    pub max_memory_mb: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_steps: 50, max_memory_mb: 100 }
    }
}

impl HistoryConfig {
    pub fn max_memory_bytes(&self) -> Option<usize> {
        (self.max_memory_mb > 0).then(|| self.max_memory_mb * 1024 * 1024)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickMaskConfig {
    pub color: [u8; 4],
    pub inverted: bool,
}

impl Default for QuickMaskConfig {
    fn default() -> Self {
        Self { color: [255, 0, 0, 128], inverted: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub color: [u8; 4],
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { color: [0, 0, 0, 128] }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None, stderr: false }
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config = Self::from_toml_str(&text)?;
        log::info!("loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn quick_mask_color(&self) -> Rgba<u8> {
        Rgba(self.quick_mask.color)
    }

    pub fn selection_color(&self) -> Rgba<u8> {
        Rgba(self.selection.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.history.max_steps, 50);
        assert_eq!(cfg.history.max_memory_bytes(), Some(100 * 1024 * 1024));
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let cfg = EngineConfig::from_toml_str(
            "[quick_mask]\ninverted = true\n[history]\nmax_memory_mb = 0\n[transform]\ninterpolation = \"cubic\"\n",
        )
        .unwrap();
        assert!(cfg.quick_mask.inverted);
        assert_eq!(cfg.quick_mask.color, [255, 0, 0, 128]);
        assert_eq!(cfg.history.max_memory_bytes(), None);
        assert_eq!(cfg.transform.interpolation, Interpolation::Cubic);
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        assert!(matches!(EngineConfig::from_toml_str("history = 3"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let log = LogConfig { level: "chatty".into(), ..LogConfig::default() };
        assert_eq!(log.level_filter(), log::LevelFilter::Info);
    }
}
