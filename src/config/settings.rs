//! Configuration sections
//!
//! Each section deserializes with `#[serde(default)]`, so a config file only
//! needs to name the values it changes.
//!
//! # Main Types
//!
//! - [`WorkerConfig`] - Worker program, argument template and noise filter
//! - [`SchedulerConfig`] - Poll interval, progress channel capacity, compile depth
//! - [`BakeDefaults`] - Default resolution for new graphs
//! - [`PresetConfig`] - Custom pass preset directory
//! - [`LogConfig`] - Log file directory and filter
//!
//! # Argument Template
//!
//! Worker arguments are a template. Before launch these placeholders are
//! substituted:
//!
//! - `{snapshot}` - Path of the scene snapshot the worker opens
//! - `{script}` - The configured worker script
//! - `{descriptor}` - The serialized work descriptor

use crate::graph::nodes::settings::{MAX_RESOLUTION, MAX_SAMPLES, MIN_RESOLUTION};
use crate::graph::nodes::BakeSetting;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ==================== Worker ====================

/// How bake units are launched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker executable
    pub program: String,
    /// Argument template
    pub args: Vec<String>,
    /// Script passed to the worker through `{script}`
    pub script: Option<PathBuf>,
    /// Output lines starting with one of these are dropped
    pub noise_prefixes: Vec<String>,
    /// Directory for scene snapshots; the system temp dir when unset
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "blender".to_string(),
            args: default_worker_args(),
            script: None,
            noise_prefixes: default_noise_prefixes(),
            snapshot_dir: None,
        }
    }
}

fn default_worker_args() -> Vec<String> {
    [
        "{snapshot}",
        "-b",
        "-P",
        "{script}",
        "--factory-startup",
        "--",
        "-bnc",
        "{descriptor}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_noise_prefixes() -> Vec<String> {
    ["Read blend: ", "Info: ", "Blender quit"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl WorkerConfig {
    /// Config for running a worker binary directly, with the descriptor flag only
    pub fn direct(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![
                "{snapshot}".to_string(),
                "--".to_string(),
                "-bnc".to_string(),
                "{descriptor}".to_string(),
            ],
            ..Default::default()
        }
    }

    /// Directory scene snapshots are written to
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

// ==================== Scheduler ====================

/// Task scheduler tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between queue checks while idle or paused
    pub poll_interval_ms: u64,
    /// Capacity of the scheduler → host progress channel
    pub progress_channel_capacity: usize,
    /// Upper bound on upstream recursion while compiling
    pub max_compile_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            progress_channel_capacity: 1024,
            max_compile_depth: crate::graph::DEFAULT_MAX_DEPTH,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ==================== Bake / Presets / Log ====================

/// Defaults applied to new graphs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeDefaults {
    pub resolution: [u32; 2],
    pub samples: u32,
}

impl Default for BakeDefaults {
    fn default() -> Self {
        Self {
            resolution: [512, 512],
            samples: 1,
        }
    }
}

impl BakeDefaults {
    /// Settings node values for a new graph, clamped into the accepted bounds.
    pub fn bake_setting(&self) -> BakeSetting {
        let side = |v: u32| v.clamp(MIN_RESOLUTION, MAX_RESOLUTION);
        BakeSetting {
            resolution: [side(self.resolution[0]), side(self.resolution[1])],
            samples: self.samples.clamp(1, MAX_SAMPLES),
            ..Default::default()
        }
    }
}

/// Where custom pass presets are loaded from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    /// Preset directory; `<app data>/presets` when unset
    pub directory: Option<PathBuf>,
}

impl PresetConfig {
    pub fn directory(&self) -> Option<PathBuf> {
        self.directory
            .clone()
            .or_else(|| super::app_data_dir().map(|p| p.join("presets")))
    }
}

/// Log output configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Also write a daily-rotated log file here
    pub directory: Option<PathBuf>,
    /// Filter directive used when `RUST_LOG` is not set
    pub filter: Option<String>,
}

impl LogConfig {
    pub const DEFAULT_FILTER: &'static str = "info,texbake=debug";

    pub fn filter(&self) -> &str {
        self.filter.as_deref().unwrap_or(Self::DEFAULT_FILTER)
    }
}
