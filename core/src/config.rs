//! Configuration for the Bifrost Mail push core

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{BifrostError, BifrostResult};

/// Push core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Reconnect policy settings
    pub reconnect: ReconnectConfig,
    /// Health monitor settings
    pub health: HealthConfig,
    /// Connect timeout (seconds)
    pub connect_timeout_secs: u64,
    /// Settle delay between closing and reopening a connection (milliseconds)
    pub settle_delay_ms: u64,
    /// Folder assumed when a notification does not name one
    pub default_folder: String,
    /// Per-folder message limit passed to the sync collaborator
    pub sync_limit: u32,
}

/// Reconnect policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Base retry delay (milliseconds)
    pub base_delay_ms: u64,
    /// Retry delay ceiling (milliseconds)
    pub max_delay_ms: u64,
    /// Random jitter added to each delay (milliseconds); zero disables
    pub jitter_ms: u64,
    /// Attempt ceiling before a cooldown
    pub max_attempts: u32,
    /// Cooldown after exhausting the attempt ceiling (seconds)
    pub failure_cooldown_secs: u64,
    /// Cooldown after a permanent failure (seconds)
    pub permanent_cooldown_secs: u64,
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Sweep interval (seconds)
    pub sweep_interval_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            health: HealthConfig::default(),
            connect_timeout_secs: crate::DEFAULT_CONNECT_TIMEOUT_SECS,
            settle_delay_ms: crate::DEFAULT_SETTLE_DELAY_MS,
            default_folder: crate::DEFAULT_FOLDER.to_string(),
            sync_limit: crate::DEFAULT_SYNC_LIMIT,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: crate::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: crate::DEFAULT_MAX_DELAY_MS,
            jitter_ms: crate::DEFAULT_JITTER_MS,
            max_attempts: crate::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            failure_cooldown_secs: crate::DEFAULT_FAILURE_COOLDOWN_SECS,
            permanent_cooldown_secs: crate::DEFAULT_PERMANENT_COOLDOWN_SECS,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: crate::DEFAULT_HEALTH_SWEEP_SECS,
        }
    }
}

impl PushConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> BifrostResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> BifrostResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load defaults, then apply `BIFROST_*` environment overrides
    pub fn load_from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("BIFROST_BASE_DELAY_MS") {
            if let Ok(ms) = value.parse() {
                config.reconnect.base_delay_ms = ms;
            }
        }

        if let Ok(value) = std::env::var("BIFROST_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(attempts) = value.parse() {
                config.reconnect.max_attempts = attempts;
            }
        }

        if let Ok(value) = std::env::var("BIFROST_FAILURE_COOLDOWN_SECS") {
            if let Ok(secs) = value.parse() {
                config.reconnect.failure_cooldown_secs = secs;
            }
        }

        if let Ok(value) = std::env::var("BIFROST_PERMANENT_COOLDOWN_SECS") {
            if let Ok(secs) = value.parse() {
                config.reconnect.permanent_cooldown_secs = secs;
            }
        }

        if let Ok(value) = std::env::var("BIFROST_HEALTH_SWEEP_SECS") {
            if let Ok(secs) = value.parse() {
                config.health.sweep_interval_secs = secs;
            }
        }

        if let Ok(value) = std::env::var("BIFROST_CONNECT_TIMEOUT_SECS") {
            if let Ok(secs) = value.parse() {
                config.connect_timeout_secs = secs;
            }
        }

        if let Ok(folder) = std::env::var("BIFROST_DEFAULT_FOLDER") {
            if !folder.is_empty() {
                config.default_folder = folder;
            }
        }

        if let Ok(value) = std::env::var("BIFROST_SYNC_LIMIT") {
            if let Ok(limit) = value.parse() {
                config.sync_limit = limit;
            }
        }

        config
    }

    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Settle delay as a duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> BifrostResult<()> {
        if self.reconnect.base_delay_ms == 0 {
            return Err(BifrostError::config("Base retry delay cannot be zero"));
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(BifrostError::config(
                "Retry delay ceiling cannot be below the base delay",
            ));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(BifrostError::config("Attempt ceiling cannot be zero"));
        }

        if self.reconnect.failure_cooldown_secs == 0 {
            return Err(BifrostError::config("Failure cooldown cannot be zero"));
        }

        if self.health.sweep_interval_secs == 0 {
            return Err(BifrostError::config("Health sweep interval cannot be zero"));
        }

        if self.connect_timeout_secs == 0 {
            return Err(BifrostError::config("Connect timeout cannot be zero"));
        }

        if self.default_folder.is_empty() {
            return Err(BifrostError::config("Default folder cannot be empty"));
        }

        Ok(())
    }
}

impl ReconnectConfig {
    /// Failure cooldown as a duration
    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }

    /// Permanent-failure cooldown as a duration
    pub fn permanent_cooldown(&self) -> Duration {
        Duration::from_secs(self.permanent_cooldown_secs)
    }
}

impl HealthConfig {
    /// Sweep interval as a duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
