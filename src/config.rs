// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub demo: DemoConfig,
    pub debug: DebugConfig,
}

/// Demo settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Path to the precompiled compute kernel
    pub shader_path: String,
    /// Number of i32 elements in each storage buffer
    pub element_count: u32,
    /// false bypasses gpu-allocator and allocates host-visible memory manually
    pub use_allocator: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            shader_path: "shaders/square.comp.spv".to_string(),
            element_count: 10,
            use_allocator: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    /// Allocator statistics written after the demo buffers are released
    pub allocator_report: String,
    /// Allocator statistics written while the scratch buffers are live
    pub scratch_report: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            allocator_report: "allocator_stats.txt".to_string(),
            scratch_report: "allocator_stats_scratch.txt".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_demo() {
        let config = Config::default();
        assert_eq!(config.demo.shader_path, "shaders/square.comp.spv");
        assert_eq!(config.demo.element_count, 10);
        assert!(config.demo.use_allocator);
        assert!(config.debug.validation_layers);
        assert_eq!(config.debug.allocator_report, "allocator_stats.txt");
        assert_eq!(config.debug.scratch_report, "allocator_stats_scratch.txt");
    }

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
            [demo]
            shader_path = "kernels/double.spv"
            element_count = 32
            use_allocator = false

            [debug]
            validation_layers = false
            allocator_report = "stats.txt"
            scratch_report = "stats_scratch.txt"
            "#,
        )
        .unwrap();

        assert_eq!(config.demo.shader_path, "kernels/double.spv");
        assert_eq!(config.demo.element_count, 32);
        assert!(!config.demo.use_allocator);
        assert!(!config.debug.validation_layers);
        assert_eq!(config.debug.allocator_report, "stats.txt");
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [demo]
            element_count = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.demo.element_count, 4);
        assert_eq!(config.demo.shader_path, "shaders/square.comp.spv");
        assert!(config.debug.validation_layers);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from_path("does-not-exist.toml").unwrap();
        assert_eq!(config.demo.element_count, 10);
    }
}
