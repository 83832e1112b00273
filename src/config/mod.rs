//! Configuration module for depthvis-rs
//!
//! A [`PipelineConfig`] describes everything a [`Pipeline`](crate::Pipeline)
//! needs at construction: queue capacities, synchronizer tuning, initial
//! filter settings and worker timing. It is plain serde data and can be
//! stored as JSON or TOML; the format follows the file extension.
//!
//! # Config Location
//!
//! The default file lives in the platform config directory:
//! - **Linux**: `~/.config/depthvis-rs/pipeline.toml`
//! - **macOS**: `~/Library/Application Support/depthvis-rs/pipeline.toml`
//! - **Windows**: `%APPDATA%\depthvis-rs\pipeline.toml`
//!
//! # Example
//!
//! ```ignore
//! use depthvis_rs::config::PipelineConfig;
//!
//! let mut config = PipelineConfig::load_or_default();
//! config.sync.staleness_timeout_ms = 80.0;
//! config.save_to_default()?;
//! ```

use crate::error::{DepthVisError, Result};
use crate::processing::FilterConfig;
use crate::sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "depthvis-rs";

/// Default config filename
pub const CONFIG_FILE: &str = "pipeline.toml";

/// Default intake queue slots
pub const DEFAULT_INTAKE_CAPACITY: usize = 4;

/// Default output queue slots
pub const DEFAULT_OUTPUT_CAPACITY: usize = 3;

/// Default slots per stream in the frame queue registry
pub const DEFAULT_PER_STREAM_CAPACITY: usize = 4;

/// Default diagnostic event channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default worker wait on an empty intake queue, in milliseconds
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 50;

/// Default interval between stats events, in milliseconds
pub const DEFAULT_STATS_INTERVAL_MS: u64 = 1000;

// ==================== Config Directory ====================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// On-disk format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// `.json` is JSON; anything else is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

// ==================== Config Sections ====================

/// Queue capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Frames buffered between capture and the worker
    pub intake_capacity: usize,
    /// Finished results buffered for the consumer
    pub output_capacity: usize,
    /// Latest frames kept per stream
    pub per_stream_capacity: usize,
    /// Diagnostic events buffered for the consumer
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            per_stream_capacity: DEFAULT_PER_STREAM_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Worker timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long the worker waits for a frame before re-checking state
    pub poll_timeout_ms: u64,
    /// How often a stats event is emitted
    pub stats_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            stats_interval_ms: DEFAULT_STATS_INTERVAL_MS,
        }
    }
}

impl WorkerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub queues: QueueConfig,
    pub sync: SyncConfig,
    pub filters: FilterConfig,
    pub worker: WorkerConfig,
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let queues = [
            ("intake_capacity", self.queues.intake_capacity),
            ("output_capacity", self.queues.output_capacity),
            ("per_stream_capacity", self.queues.per_stream_capacity),
            ("event_capacity", self.queues.event_capacity),
        ];
        for (name, value) in queues {
            if value == 0 {
                return Err(DepthVisError::InvalidConfig(format!("{} must be at least 1", name)));
            }
        }
        if self.worker.poll_timeout_ms == 0 {
            return Err(DepthVisError::InvalidConfig(
                "poll_timeout_ms must be at least 1".to_string(),
            ));
        }
        self.sync.validate()?;
        self.filters.validate()
    }

    /// Parse configuration text in the given format
    pub fn from_str_as(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| DepthVisError::Serialization(format!("Invalid JSON config: {}", e))),
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| DepthVisError::Serialization(format!("Invalid TOML config: {}", e))),
        }
    }

    /// Render configuration text in the given format
    pub fn to_string_as(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| {
                DepthVisError::Serialization(format!("Failed to serialize config: {}", e))
            }),
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| {
                DepthVisError::Serialization(format!("Failed to serialize config: {}", e))
            }),
        }
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DepthVisError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_str_as(&content, ConfigFormat::from_path(path))
            .map_err(|e| e.with_context(format!("{:?}", path)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default config file, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to `path`, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DepthVisError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = self.to_string_as(ConfigFormat::from_path(path))?;
        std::fs::write(path, content).map_err(|e| {
            DepthVisError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Save to the default config location
    pub fn save_to_default(&self) -> Result<PathBuf> {
        let path = default_config_path().ok_or_else(|| {
            DepthVisError::Config("Could not determine config directory".to_string())
        })?;
        self.save(&path)?;
        Ok(path)
    }
}
