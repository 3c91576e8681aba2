//! Configuration module for texbake
//!
//! This module handles application configuration including:
//! - Worker process launch settings (program, argument template, noise filter)
//! - Scheduler tuning (poll interval, channel capacity, compile depth)
//! - Bake defaults, preset directory and log output
//!
//! # App Data Location
//!
//! Configuration is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.texbake/`
//! - **macOS**: `~/Library/Application Support/dev.texbake/`
//! - **Windows**: `%APPDATA%\dev.texbake\`
//!
//! # Files
//!
//! - `config.toml` - Application configuration
//! - `presets/*.json` - Custom pass presets (see [`presets`])
//!
//! # Example
//!
//! ```ignore
//! use texbake::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default();
//! config.scheduler.poll_interval_ms = 50;
//! config.save()?;
//! ```

pub mod presets;
pub mod settings;

pub use presets::{ParamDescriptor, ParamKind, PresetDescriptor, PresetTable};
pub use settings::{BakeDefaults, LogConfig, PresetConfig, SchedulerConfig, WorkerConfig};

use crate::error::{BakeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier used for the data directory
pub const APP_ID: &str = "dev.texbake";

/// Configuration file name
pub const CONFIG_FILE: &str = "config.toml";

/// Get the application data directory
///
/// Returns the platform-appropriate directory for storing application data.
/// Returns None if the directory cannot be determined.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the application data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        BakeError::Config("Could not determine application data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .map_err(|e| BakeError::Config(format!("Failed to create app data directory: {}", e)))?;
    }

    Ok(dir)
}

/// Get the path to the default configuration file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Application Config ====================

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// How bake units are launched
    pub worker: WorkerConfig,
    /// Task scheduler tuning
    pub scheduler: SchedulerConfig,
    /// Defaults applied to new graphs
    pub bake: BakeDefaults,
    /// Where custom pass presets live
    pub presets: PresetConfig,
    /// Log output
    pub log: LogConfig,
}

impl AppConfig {
    /// Load the configuration from the default location
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = config_path().ok_or_else(|| {
            BakeError::Config("Could not determine config path".to_string())
        })?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::from_path(&path)
    }

    /// Load configuration, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Load configuration from an explicit TOML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BakeError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| e.with_context(format!("Config file {:?}", path)))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BakeError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(CONFIG_FILE))
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BakeError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| BakeError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| BakeError::Config(format!("Failed to write config: {}", e)))
    }

    /// Load the preset table from the configured directory
    ///
    /// A missing directory yields an empty table.
    pub fn load_presets(&self) -> Result<PresetTable> {
        match self.presets.directory() {
            Some(dir) if dir.exists() => PresetTable::load_dir(&dir),
            Some(dir) => {
                tracing::debug!("Preset directory {:?} does not exist", dir);
                Ok(PresetTable::new())
            }
            None => Ok(PresetTable::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_data_dir() {
        // Should return Some on most systems
        let dir = app_data_dir();
        if let Some(d) = dir {
            assert!(d.ends_with(APP_ID));
        }
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [worker]
            program = "/opt/blender/blender"

            [scheduler]
            poll_interval_ms = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.worker.program, "/opt/blender/blender");
        assert_eq!(config.worker.args, WorkerConfig::default().args);
        assert_eq!(config.scheduler.poll_interval_ms, 25);
        assert_eq!(config.scheduler.progress_channel_capacity, 1024);
        assert_eq!(config.bake.resolution, [512, 512]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.log.filter = Some("warn".to_string());
        config.scheduler.max_compile_depth = 32;
        config.save_to(&path).unwrap();

        let reloaded = AppConfig::from_path(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = AppConfig::from_toml_str("[worker\nprogram = ").unwrap_err();
        assert!(matches!(err, BakeError::Config(_)));
    }

    #[test]
    fn test_missing_preset_dir_is_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.presets.directory = Some(dir.path().join("absent"));
        assert!(config.load_presets().unwrap().is_empty());
    }
}
