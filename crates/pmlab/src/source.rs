// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample sources feeding the acquisition loop.
//!
//! A [`SampleSource`] fills caller-supplied buffers grouped by channel:
//!
//! ```text
//! analog[c * points + i]   sample i of channel c
//! digital[c * points + i]
//! ```
//!
//! where `points` is the value returned by `acquire`. Hardware drivers
//! implement the trait outside this crate; [`PatternSource`] is the built-in
//! simulated device.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default sampling rate of the simulated device (Hz).
pub const DEFAULT_SAMPLING_RATE_HZ: u32 = 30_000;

/// Period of the simulated ramp and trigger pattern (points).
pub const PATTERN_PERIOD: usize = 10;

/// Point index (modulo the period) where every channel fires a trigger.
const COMMON_TRIGGER_INDEX: usize = 6;

/// Acquisition failures. Every variant is fatal to the acquisition loop.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Device reported a fault
    #[error("device fault: {0}")]
    Device(String),

    /// No data within the acquisition timeout
    #[error("acquisition timed out after {0:?}")]
    Timeout(Duration),

    /// Caller buffers cannot hold the requested block
    #[error("buffer too small: need {needed} samples, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    /// I/O error talking to the device
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// External acquisition device.
pub trait SampleSource: Send {
    /// Number of channels delivered by every call.
    fn channel_count(&self) -> u32;

    /// Sampling rate announced to clients.
    fn sampling_rate_hz(&self) -> u32;

    /// Read up to `max_points` points per channel into `analog` and `digital`.
    ///
    /// Both buffers hold at least `channel_count * max_points` values.
    /// Returns the number of points per channel actually written; zero means
    /// no data was available yet.
    fn acquire(
        &mut self,
        max_points: u32,
        timeout: Duration,
        analog: &mut [f64],
        digital: &mut [bool],
    ) -> Result<u32, SourceError>;
}

/// How [`PatternSource`] spaces successive calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Return immediately
    #[default]
    None,
    /// Sleep `points / sampling_rate` per call, like a real device
    RealTime,
    /// Sleep a fixed number of milliseconds per call
    FixedMillis(u64),
}

/// Simulated device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Number of simulated channels
    #[serde(default = "default_channels")]
    pub channels: u32,

    /// Announced sampling rate (Hz)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate_hz: u32,

    /// Points per channel returned by each call (capped by the request)
    #[serde(default = "default_points_per_call")]
    pub points_per_call: u32,

    /// Call spacing
    #[serde(default)]
    pub pacing: Pacing,
}

fn default_channels() -> u32 {
    3
}

fn default_sampling_rate() -> u32 {
    DEFAULT_SAMPLING_RATE_HZ
}

fn default_points_per_call() -> u32 {
    PATTERN_PERIOD as u32
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            sampling_rate_hz: default_sampling_rate(),
            points_per_call: default_points_per_call(),
            pacing: Pacing::default(),
        }
    }
}

impl SourceConfig {
    /// Reject configurations the simulated device cannot honour.
    pub fn validate(&self) -> Result<(), String> {
        if self.channels == 0 {
            return Err("channels cannot be 0".into());
        }
        if self.sampling_rate_hz == 0 {
            return Err("sampling_rate_hz cannot be 0".into());
        }
        if self.points_per_call == 0 {
            return Err("points_per_call cannot be 0".into());
        }
        Ok(())
    }

    /// Build the simulated device.
    pub fn build(&self) -> PatternSource {
        PatternSource::new(self.channels, self.sampling_rate_hz)
            .with_points_per_call(self.points_per_call)
            .with_pacing(self.pacing)
    }
}

/// Deterministic simulated device.
///
/// Every channel carries a repeating ramp `0.1, 0.2, .. 1.0`. The digital
/// line of channel `c` is high at point `c mod 10` and at point 6 of each
/// period. The pattern phase continues across calls.
#[derive(Debug)]
pub struct PatternSource {
    channels: u32,
    sampling_rate_hz: u32,
    points_per_call: u32,
    pacing: Pacing,
    phase: usize,
    calls: u64,
    fail_after: Option<u64>,
    last_call: Option<Instant>,
}

impl PatternSource {
    pub fn new(channels: u32, sampling_rate_hz: u32) -> Self {
        Self {
            channels,
            sampling_rate_hz,
            points_per_call: PATTERN_PERIOD as u32,
            pacing: Pacing::None,
            phase: 0,
            calls: 0,
            fail_after: None,
            last_call: None,
        }
    }

    pub fn with_points_per_call(mut self, points: u32) -> Self {
        self.points_per_call = points;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Report a device fault once `calls` successful calls were served.
    pub fn with_fault_after(mut self, calls: u64) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Number of successful calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Analog value at absolute point index `point`.
    pub fn analog_value(point: usize) -> f64 {
        ((point % PATTERN_PERIOD) + 1) as f64 / PATTERN_PERIOD as f64
    }

    /// Digital value of `channel` at absolute point index `point`.
    pub fn digital_value(channel: u32, point: usize) -> bool {
        let idx = point % PATTERN_PERIOD;
        idx == channel as usize % PATTERN_PERIOD || idx == COMMON_TRIGGER_INDEX
    }

    fn pace(&mut self, points: u32) {
        let interval = match self.pacing {
            Pacing::None => return,
            Pacing::RealTime => {
                Duration::from_secs_f64(f64::from(points) / f64::from(self.sampling_rate_hz))
            }
            Pacing::FixedMillis(ms) => Duration::from_millis(ms),
        };

        let now = Instant::now();
        if let Some(last) = self.last_call {
            let elapsed = now.duration_since(last);
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

impl SampleSource for PatternSource {
    fn channel_count(&self) -> u32 {
        self.channels
    }

    fn sampling_rate_hz(&self) -> u32 {
        self.sampling_rate_hz
    }

    fn acquire(
        &mut self,
        max_points: u32,
        _timeout: Duration,
        analog: &mut [f64],
        digital: &mut [bool],
    ) -> Result<u32, SourceError> {
        if self.fail_after.is_some_and(|limit| self.calls >= limit) {
            return Err(SourceError::Device(format!(
                "simulated fault after {} calls",
                self.calls
            )));
        }

        let points = self.points_per_call.min(max_points);
        let needed = self.channels as usize * points as usize;
        let actual = analog.len().min(digital.len());
        if actual < needed {
            return Err(SourceError::BufferTooSmall { needed, actual });
        }

        self.pace(points);

        let points = points as usize;
        for channel in 0..self.channels {
            let base = channel as usize * points;
            for i in 0..points {
                let point = self.phase + i;
                analog[base + i] = Self::analog_value(point);
                digital[base + i] = Self::digital_value(channel, point);
            }
        }

        self.phase = (self.phase + points) % PATTERN_PERIOD;
        self.calls += 1;
        Ok(points as u32)
    }
}
