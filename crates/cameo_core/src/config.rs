//! Compositor configuration
//!
//! Defaults suit a 30 fps virtual camera. A TOML file can override any field
//! and `CAMEO_*` environment variables override both at startup:
//!
//! - `CAMEO_CLEAR_COLOR=0x000000`
//! - `CAMEO_ALPHA=1`
//! - `CAMEO_MAX_PENDING_QUERIES=30`
//! - `CAMEO_BENCHMARK_FRAMES=1`
//! - `CAMEO_GPU_TIER=high|low`
//! - `CAMEO_CHECK_ERRORS=1`

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::GpuTier;
use crate::error::ConfigError;
use crate::geometry::Color;
use crate::timing::DEFAULT_MAX_PENDING_QUERIES;

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn env_hex(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| {
        let v = v.trim();
        let digits = v
            .strip_prefix("0x")
            .or_else(|| v.strip_prefix('#'))
            .unwrap_or(v);
        u32::from_str_radix(digits, 16).ok()
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Color the default target is cleared to each frame
    pub clear_color: Color,
    /// Keep an alpha channel in the output; snapshots always drop it
    pub alpha: bool,
    /// Timer queries still pending beyond this count are discarded
    pub max_pending_queries: usize,
    /// Time every frame on the GPU and report it to the frame callback
    pub benchmark_frames: bool,
    /// Replace the tier derived from the renderer string
    pub gpu_tier: Option<GpuTier>,
    /// Poll the backend for errors after every draw
    pub check_errors: bool,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            clear_color: Color::TRANSPARENT,
            alpha: true,
            max_pending_queries: DEFAULT_MAX_PENDING_QUERIES,
            benchmark_frames: false,
            gpu_tier: None,
            check_errors: false,
        }
    }
}

impl CompositorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply `CAMEO_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(rgb) = env_hex("CAMEO_CLEAR_COLOR") {
            self.clear_color = Color::from_hex(rgb);
        }
        if let Some(v) = env_bool("CAMEO_ALPHA") {
            self.alpha = v;
        }
        if let Some(v) = env_u64("CAMEO_MAX_PENDING_QUERIES") {
            self.max_pending_queries = v as usize;
        }
        if let Some(v) = env_bool("CAMEO_BENCHMARK_FRAMES") {
            self.benchmark_frames = v;
        }
        if let Ok(v) = std::env::var("CAMEO_GPU_TIER") {
            match v.trim().to_ascii_lowercase().as_str() {
                "high" => self.gpu_tier = Some(GpuTier::High),
                "low" => self.gpu_tier = Some(GpuTier::Low),
                other => tracing::warn!("Ignoring CAMEO_GPU_TIER={}", other),
            }
        }
        if let Some(v) = env_bool("CAMEO_CHECK_ERRORS") {
            self.check_errors = v;
        }

        self.max_pending_queries = self.max_pending_queries.max(1);
        self
    }

    pub fn log(&self) {
        tracing::info!(
            "compositor config: clear_color={:?}, alpha={}, max_pending_queries={}, benchmark_frames={}, gpu_tier={:?}, check_errors={}",
            self.clear_color.to_array(),
            self.alpha,
            self.max_pending_queries,
            self.benchmark_frames,
            self.gpu_tier,
            self.check_errors
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompositorConfig::default();
        assert_eq!(config.max_pending_queries, 30);
        assert!(config.alpha);
        assert!(config.gpu_tier.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CompositorConfig::from_toml_str(
            r#"
            gpu_tier = "high"
            check_errors = true

            [clear_color]
            r = 1.0
            g = 0.0
            b = 0.0
            a = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.gpu_tier, Some(GpuTier::High));
        assert!(config.check_errors);
        assert_eq!(config.clear_color, Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(config.max_pending_queries, 30);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(matches!(
            CompositorConfig::from_toml_str("max_pending_queries = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
