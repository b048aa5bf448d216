// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample block produced by one acquisition cycle.
//!
//! A [`Frame`] holds `channel_count` channels of `points_per_channel` samples
//! each, stored channel-major in two flat arrays:
//!
//! ```text
//! analog:  [ ch0 p0 .. ch0 pN | ch1 p0 .. ch1 pN | ... ]
//! digital: [ ch0 p0 .. ch0 pN | ch1 p0 .. ch1 pN | ... ]
//! ```
//!
//! This matches the group-by-channel layout delivered by the sample source,
//! so publishing a block is a single copy.

use thiserror::Error;

/// Frame construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Sample arrays do not match `channel_count x points_per_channel`.
    #[error(
        "sample array of {actual} values does not match {channels} channels x {points} points"
    )]
    ShapeMismatch {
        channels: u32,
        points: u32,
        actual: usize,
    },

    /// Channels passed to [`Frame::from_channels`] have different lengths.
    #[error("channel {channel} has {actual} points, expected {expected}")]
    RaggedChannel {
        channel: usize,
        expected: usize,
        actual: usize,
    },
}

/// One timestamped block of per-channel analog and digital samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    timestamp_nanos: u64,
    channel_count: u32,
    points_per_channel: u32,
    analog: Vec<f64>,
    digital: Vec<bool>,
}

impl Frame {
    /// Build a frame from channel-major sample arrays.
    pub fn new(
        timestamp_nanos: u64,
        channel_count: u32,
        points_per_channel: u32,
        analog: Vec<f64>,
        digital: Vec<bool>,
    ) -> Result<Self, FrameError> {
        let expected = channel_count as usize * points_per_channel as usize;
        for actual in [analog.len(), digital.len()] {
            if actual != expected {
                return Err(FrameError::ShapeMismatch {
                    channels: channel_count,
                    points: points_per_channel,
                    actual,
                });
            }
        }

        Ok(Self {
            timestamp_nanos,
            channel_count,
            points_per_channel,
            analog,
            digital,
        })
    }

    /// Build a frame from per-channel `(analog, digital)` pairs.
    ///
    /// Every channel must carry the same number of points.
    pub fn from_channels(
        timestamp_nanos: u64,
        channels: &[(Vec<f64>, Vec<bool>)],
    ) -> Result<Self, FrameError> {
        let points = channels.first().map_or(0, |(a, _)| a.len());
        let mut analog = Vec::with_capacity(points * channels.len());
        let mut digital = Vec::with_capacity(points * channels.len());

        for (idx, (a, d)) in channels.iter().enumerate() {
            for actual in [a.len(), d.len()] {
                if actual != points {
                    return Err(FrameError::RaggedChannel {
                        channel: idx,
                        expected: points,
                        actual,
                    });
                }
            }
            analog.extend_from_slice(a);
            digital.extend_from_slice(d);
        }

        Self::new(
            timestamp_nanos,
            channels.len() as u32,
            points as u32,
            analog,
            digital,
        )
    }

    pub fn timestamp_nanos(&self) -> u64 {
        self.timestamp_nanos
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    pub fn points_per_channel(&self) -> u32 {
        self.points_per_channel
    }

    /// Total number of samples per kind (`channel_count * points_per_channel`).
    pub fn sample_count(&self) -> usize {
        self.analog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analog.is_empty()
    }

    /// Analog samples of one channel, `None` if out of range.
    pub fn analog(&self, channel: u32) -> Option<&[f64]> {
        self.channel_range(channel).map(|r| &self.analog[r])
    }

    /// Digital samples of one channel, `None` if out of range.
    pub fn digital(&self, channel: u32) -> Option<&[bool]> {
        self.channel_range(channel).map(|r| &self.digital[r])
    }

    /// All analog samples, channel-major.
    pub fn analog_samples(&self) -> &[f64] {
        &self.analog
    }

    /// All digital samples, channel-major.
    pub fn digital_samples(&self) -> &[bool] {
        &self.digital
    }

    /// Copy the requested channels, in request order, into a new frame.
    ///
    /// Returns `None` if any requested channel does not exist. Duplicate
    /// ids are copied as many times as they are requested.
    pub fn select(&self, channels: &[u32]) -> Option<Frame> {
        let points = self.points_per_channel as usize;
        let mut analog = Vec::with_capacity(points * channels.len());
        let mut digital = Vec::with_capacity(points * channels.len());

        for &channel in channels {
            let range = self.channel_range(channel)?;
            analog.extend_from_slice(&self.analog[range.clone()]);
            digital.extend_from_slice(&self.digital[range]);
        }

        Some(Frame {
            timestamp_nanos: self.timestamp_nanos,
            channel_count: channels.len() as u32,
            points_per_channel: self.points_per_channel,
            analog,
            digital,
        })
    }

    /// Overwrite this frame in place, reusing its allocations.
    ///
    /// `analog` and `digital` must hold `channel_count * points_per_channel`
    /// values; longer slices are truncated.
    pub(crate) fn refill(
        &mut self,
        timestamp_nanos: u64,
        channel_count: u32,
        points_per_channel: u32,
        analog: &[f64],
        digital: &[bool],
    ) {
        let len = channel_count as usize * points_per_channel as usize;
        self.timestamp_nanos = timestamp_nanos;
        self.channel_count = channel_count;
        self.points_per_channel = points_per_channel;
        self.analog.clear();
        self.analog.extend_from_slice(&analog[..len]);
        self.digital.clear();
        self.digital.extend_from_slice(&digital[..len]);
    }

    fn channel_range(&self, channel: u32) -> Option<std::ops::Range<usize>> {
        if channel >= self.channel_count {
            return None;
        }
        let points = self.points_per_channel as usize;
        let start = channel as usize * points;
        Some(start..start + points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_channel_frame() -> Frame {
        Frame::from_channels(
            42,
            &[
                (vec![0.1, 0.2], vec![true, false]),
                (vec![1.1, 1.2], vec![false, false]),
                (vec![2.1, 2.2], vec![false, true]),
            ],
        )
        .expect("valid frame")
    }

    #[test]
    fn test_new_rejects_wrong_shape() {
        let err = Frame::new(0, 2, 3, vec![0.0; 6], vec![false; 5]).unwrap_err();
        assert_eq!(
            err,
            FrameError::ShapeMismatch {
                channels: 2,
                points: 3,
                actual: 5
            }
        );
    }

    #[test]
    fn test_from_channels_rejects_ragged() {
        let err = Frame::from_channels(
            0,
            &[(vec![0.0, 1.0], vec![false, true]), (vec![0.0], vec![false])],
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::RaggedChannel { channel: 1, .. }));
    }

    #[test]
    fn test_channel_accessors() {
        let frame = three_channel_frame();
        assert_eq!(frame.channel_count(), 3);
        assert_eq!(frame.points_per_channel(), 2);
        assert_eq!(frame.analog(1), Some(&[1.1, 1.2][..]));
        assert_eq!(frame.digital(2), Some(&[false, true][..]));
        assert!(frame.analog(3).is_none());
    }

    #[test]
    fn test_select_keeps_request_order() {
        let frame = three_channel_frame();
        let subset = frame.select(&[2, 0]).expect("channels exist");

        assert_eq!(subset.channel_count(), 2);
        assert_eq!(subset.timestamp_nanos(), 42);
        assert_eq!(subset.analog(0), Some(&[2.1, 2.2][..]));
        assert_eq!(subset.analog(1), Some(&[0.1, 0.2][..]));
        assert_eq!(subset.digital(0), Some(&[false, true][..]));
    }

    #[test]
    fn test_select_out_of_range() {
        assert!(three_channel_frame().select(&[0, 7]).is_none());
    }

    #[test]
    fn test_refill_reuses_frame() {
        let mut frame = three_channel_frame();
        frame.refill(99, 1, 3, &[5.0, 6.0, 7.0, 8.0], &[true, true, false, false]);

        assert_eq!(frame.timestamp_nanos(), 99);
        assert_eq!(frame.channel_count(), 1);
        assert_eq!(frame.analog(0), Some(&[5.0, 6.0, 7.0][..]));
        assert_eq!(frame.digital(0), Some(&[true, true, false][..]));
    }
}
