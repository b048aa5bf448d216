// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streaming server configuration.

use crate::protocol::{
    BYTES_PER_POINT, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_REQUESTED_CHANNELS, PAYLOAD_HEADER_SIZE,
};
use crate::sync::DEFAULT_BUFFER_CAPACITY;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 12345;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on, 0 picks an ephemeral port (default: 12345)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,

    /// Frames queued per client before the client is dropped
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Points per channel requested from the source each cycle
    #[serde(default = "default_points_per_channel")]
    pub points_per_channel: u32,

    /// Timeout handed to the source on each call (milliseconds)
    #[serde(default = "default_acquisition_timeout")]
    pub acquisition_timeout_ms: u64,

    /// Diagnostic wake-up period of every blocking wait (milliseconds)
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_ms: u64,

    /// Time allowed for a client to send its handshake (milliseconds)
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// Maximum channels a client may request
    #[serde(default = "default_max_requested_channels")]
    pub max_requested_channels: u32,

    /// Maximum data message payload (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Set TCP_NODELAY on client sockets
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_backlog() -> i32 {
    8
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_points_per_channel() -> u32 {
    1024
}

fn default_acquisition_timeout() -> u64 {
    10_000
}

fn default_wait_timeout() -> u64 {
    1_500
}

fn default_handshake_timeout() -> u64 {
    5_000
}

fn default_max_requested_channels() -> u32 {
    DEFAULT_MAX_REQUESTED_CHANNELS
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            backlog: default_backlog(),
            buffer_capacity: default_buffer_capacity(),
            points_per_channel: default_points_per_channel(),
            acquisition_timeout_ms: default_acquisition_timeout(),
            wait_timeout_ms: default_wait_timeout(),
            handshake_timeout_ms: default_handshake_timeout(),
            max_requested_channels: default_max_requested_channels(),
            max_message_size: default_max_message_size(),
            nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Configuration bound to an ephemeral loopback port.
    pub fn loopback() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_millis(self.acquisition_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Data message payload size of a frame carrying `channels` channels.
    pub fn payload_size(&self, channels: u32) -> usize {
        (channels as usize)
            .saturating_mul(self.points_per_channel as usize)
            .saturating_mul(BYTES_PER_POINT)
            .saturating_add(PAYLOAD_HEADER_SIZE)
    }

    /// Largest channel request whose frames fit in `max_message_size`.
    pub fn max_channels_per_message(&self) -> u32 {
        let per_channel = (self.points_per_channel as usize).saturating_mul(BYTES_PER_POINT);
        if per_channel == 0 {
            return u32::MAX;
        }
        let room = self.max_message_size.saturating_sub(PAYLOAD_HEADER_SIZE) / per_channel;
        u32::try_from(room).unwrap_or(u32::MAX)
    }

    /// Check that a full-width frame from a `channel_count` source fits in
    /// `max_message_size`.
    pub fn validate_for_source(&self, channel_count: u32) -> Result<(), ConfigError> {
        let size = self.payload_size(channel_count);
        if size > self.max_message_size {
            return Err(ConfigError::InvalidValue(format!(
                "{} channels x {} points needs {} byte payloads (max_message_size {})",
                channel_count, self.points_per_channel, size, self.max_message_size
            )));
        }
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog <= 0 {
            return Err(ConfigError::InvalidValue("backlog must be positive".into()));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "buffer_capacity cannot be 0".into(),
            ));
        }
        if self.points_per_channel == 0 {
            return Err(ConfigError::InvalidValue(
                "points_per_channel cannot be 0".into(),
            ));
        }
        if self.wait_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "wait_timeout_ms cannot be 0".into(),
            ));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "handshake_timeout_ms cannot be 0".into(),
            ));
        }
        if self.max_requested_channels == 0 {
            return Err(ConfigError::InvalidValue(
                "max_requested_channels cannot be 0".into(),
            ));
        }
        if self.max_channels_per_message() == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "max_message_size {} cannot hold one channel of {} points",
                self.max_message_size, self.points_per_channel
            )));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}
