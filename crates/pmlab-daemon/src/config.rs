// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration file.
//!
//! ```json
//! {
//!   "server": { "port": 12345, "buffer_capacity": 256 },
//!   "source": { "channels": 8, "sampling_rate_hz": 30000, "pacing": "real_time" },
//!   "metrics_interval_secs": 10
//! }
//! ```
//!
//! Every field is optional; command-line flags override file values.

use pmlab::{ConfigError, ServerConfig, SourceConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub source: SourceConfig,

    /// Period of the metrics summary log line (0 disables it)
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            source: SourceConfig::default(),
            metrics_interval_secs: default_metrics_interval(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Validate server and source sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.source.validate().map_err(ConfigError::InvalidValue)?;
        self.server.validate_for_source(self.source.channels)?;
        if self.source.points_per_call > self.server.points_per_channel {
            return Err(ConfigError::InvalidValue(format!(
                "source.points_per_call ({}) exceeds server.points_per_channel ({})",
                self.source.points_per_call, self.server.points_per_channel
            )));
        }
        Ok(())
    }
}
