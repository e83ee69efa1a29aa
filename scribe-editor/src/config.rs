//! Editor configuration, loaded from TOML.
//!
//! ```toml
//! [sync]
//! server_url = "ws://collab.example:8000"
//! debounce_ms = 500
//!
//! [assist]
//! base_url = "https://collab.example"
//! grammar_debounce_ms = 1500
//! ```
//!
//! Every key is optional; missing ones take their defaults.

use std::path::Path;
use std::time::Duration;

use scribe_assist::AssistConfig;
use scribe_collab::{ChannelConfig, ReconcilerConfig};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Room synchronization settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// WebSocket base URL of the room server
    pub server_url: String,
    /// Quiet period before a local edit is sent
    pub debounce_ms: u64,
    pub event_capacity: usize,
    pub outbound_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let channel = ChannelConfig::default();
        Self {
            server_url: channel.server_url,
            debounce_ms: 500,
            event_capacity: channel.event_capacity,
            outbound_capacity: channel.outbound_capacity,
        }
    }
}

impl SyncConfig {
    pub fn channel(&self) -> ChannelConfig {
        ChannelConfig {
            server_url: self.server_url.clone(),
            event_capacity: self.event_capacity,
            outbound_capacity: self.outbound_capacity,
        }
    }

    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub sync: SyncConfig,
    pub assist: AssistConfig,
}

impl EditorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.event_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "sync.event_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.sync.outbound_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "sync.outbound_capacity",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
