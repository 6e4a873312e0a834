//! Runtime configuration, loaded from a TOML file or built from defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Generator used for worlds created without an explicit one.
    pub default_generator: String,
    /// Seed for new worlds; a random seed is drawn when absent.
    pub default_seed: Option<u64>,
    /// Save dirty chunks and metadata every this many ticks. Disabled when
    /// absent.
    pub autosave_ticks: Option<u64>,
    /// Upper bound on lighting columns recomputed per tick.
    pub lighting_batch: usize,
    /// Radius (in chunks) pre-loaded around the spawn point.
    pub spawn_radius: i32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            default_generator: "flatgrass".to_string(),
            default_seed: None,
            autosave_ticks: Some(6000),
            lighting_batch: 1024,
            spawn_radius: 4,
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
