use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::animation::{DEFAULT_SPEED_MS, clamp_speed};
use crate::cache::CacheConfig;
use crate::culling::CullConfig;
use crate::hull::DEFAULT_HULL_PADDING;
use crate::layout::LayoutParams;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationSettings {
    pub speed_ms: u64,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            speed_ms: DEFAULT_SPEED_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HullSettings {
    pub padding: f32,
    pub enabled: bool,
}

impl Default for HullSettings {
    fn default() -> Self {
        Self {
            padding: DEFAULT_HULL_PADDING,
            enabled: true,
        }
    }
}

/// Viewer settings. Every field has a default so partial files are accepted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub layout: LayoutParams,
    pub culling: CullConfig,
    pub cache: CacheConfig,
    pub animation: AnimationSettings,
    pub hull: HullSettings,
}

impl Settings {
    pub fn from_json(input: &str) -> Result<Self> {
        let settings = serde_json::from_str::<Self>(input).context("failed to parse settings")?;
        Ok(settings.clamped())
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let input = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        Self::from_json(&input).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn clamped(mut self) -> Self {
        let defaults = Self::default();
        self.layout = self.layout.sanitized();
        self.animation.speed_ms = clamp_speed(self.animation.speed_ms);

        if !self.culling.min_zoom.is_finite() || self.culling.min_zoom <= 0.0 {
            self.culling.min_zoom = defaults.culling.min_zoom;
        }
        if !self.culling.padding.is_finite() || self.culling.padding < 0.0 {
            self.culling.padding = defaults.culling.padding;
        }
        if !self.cache.load_threshold.is_finite() || self.cache.load_threshold <= 0.0 {
            self.cache.load_threshold = defaults.cache.load_threshold;
        }
        self.cache.initial_limit = self.cache.initial_limit.max(1);
        self.cache.batch_size = self.cache.batch_size.max(1);
        if !self.hull.padding.is_finite() || self.hull.padding < 0.0 {
            self.hull.padding = defaults.hull.padding;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = Settings::from_json(r#"{"layout":{"iterations":250},"culling":{"padding":40}}"#)
            .unwrap();
        assert_eq!(settings.layout.iterations, 250);
        assert_eq!(settings.layout.ideal_edge_length, 120.0);
        assert_eq!(settings.culling.padding, 40.0);
        assert_eq!(settings.culling.min_zoom, 0.5);
        assert_eq!(settings.cache.batch_size, 500);
        assert_eq!(settings.animation.speed_ms, 1000);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = Settings::from_json(
            r#"{"animation":{"speedMs":5},"culling":{"minZoom":-1},"cache":{"batchSize":0},"layout":{"damping":4}}"#,
        )
        .unwrap();
        assert_eq!(settings.animation.speed_ms, 200);
        assert_eq!(settings.culling.min_zoom, 0.5);
        assert_eq!(settings.cache.batch_size, 1);
        assert_eq!(settings.layout.damping, 0.99);
    }

    #[test]
    fn missing_path_means_defaults() {
        assert_eq!(Settings::load(None).unwrap(), Settings::default());
        let error = Settings::load(Some(Path::new("/nonexistent/hyperlens.json"))).unwrap_err();
        assert!(format!("{error:#}").contains("failed to read settings file"));
    }
}
