//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every key is optional:
//!
//! ```toml
//! tick_rate = 60
//! frame_rate = 60
//! network_tick_interval_ms = 50
//! max_renderables = 4096
//! input_buffer_bytes = 1024
//! message_capacity = 1024
//! # seed = 7   # fixed network id seed, for reproducible sessions
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime configuration shared by all three threads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Render frames per second.
    pub frame_rate: u32,
    /// Milliseconds between replication sends.
    pub network_tick_interval_ms: u32,
    /// Entities the renderable snapshot can hold.
    pub max_renderables: u32,
    /// Size of the input TripleBuffer slots.
    pub input_buffer_bytes: u32,
    /// Bound of every bus channel.
    pub message_capacity: u32,
    /// Fixed network id seed. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            frame_rate: 60,
            network_tick_interval_ms: triad_networking::DEFAULT_NETWORK_TICK_INTERVAL_MS,
            max_renderables: 4096,
            input_buffer_bytes: 1024,
            message_capacity: 1024,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Rejects zero rates and capacities.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("tick_rate", self.tick_rate),
            ("frame_rate", self.frame_rate),
            ("max_renderables", self.max_renderables),
            ("input_buffer_bytes", self.input_buffer_bytes),
            ("message_capacity", self.message_capacity),
        ];
        match positive.iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(ConfigError::Zero(key)),
            None => Ok(()),
        }
    }

    /// Bus channel bound as a `usize`.
    #[inline]
    #[must_use]
    pub fn message_capacity(&self) -> usize {
        self.message_capacity as usize
    }
}
