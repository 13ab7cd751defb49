//! Application configuration
//!
//! Read from `<config_dir>/pixel-queue/config.json`. Every field is optional
//! in the file; anything left out takes its default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::grid::import::ImportOptions;
use crate::grid::resample::SamplingMode;
use crate::state::data::RepeatCount;

const APP_DIR: &str = "pixel-queue";
const CONFIG_FILE: &str = "config.json";
const DB_FILE: &str = "pixel_queue.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite library location
    pub database_path: PathBuf,
    /// Hex characters per generated frame or animation id
    pub frame_id_length: usize,
    /// Used when an upload carries no usable frame delay
    pub default_frame_duration_ms: u32,
    pub default_repeat: RepeatCount,
    pub sampling: SamplingMode,
    /// Upper bound on frames taken from a single GIF
    pub max_gif_frames: usize,
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            frame_id_length: 16,
            default_frame_duration_ms: 100,
            default_repeat: RepeatCount::Infinite,
            sampling: SamplingMode::Nearest,
            max_gif_frames: 512,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Where the config file lives, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load the user's config, falling back to defaults when there is no file
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_id_length == 0 {
            return Err(ConfigError::Invalid("frame_id_length must be at least 1".into()));
        }
        if self.default_frame_duration_ms == 0 {
            return Err(ConfigError::Invalid("default_frame_duration_ms must be at least 1".into()));
        }
        if self.max_gif_frames == 0 {
            return Err(ConfigError::Invalid("max_gif_frames must be at least 1".into()));
        }
        Ok(())
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            frame_id_length: self.frame_id_length,
            default_frame_duration_ms: self.default_frame_duration_ms,
            max_gif_frames: self.max_gif_frames,
        }
    }
}

/// `<data_dir>/pixel-queue/pixel_queue.db`, or under the home directory
/// when there is no data directory
pub fn default_db_path() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    path.push(APP_DIR);
    path.push(DB_FILE);
    path
}
