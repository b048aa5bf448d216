// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared slot holding the frame of the open generation.
//!
//! Written by the acquisition loop before each barrier reset, read by every
//! handler after it observes the new generation. Publish and copy-out take
//! the same lock, so a handler never sees a half-written frame.

use crate::protocol::Frame;
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    frame: Frame,
}

/// Frame published for the most recent generation.
#[derive(Debug, Default)]
pub struct PublishedFrame {
    slot: RwLock<Slot>,
}

impl PublishedFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with a new block tagged `generation`.
    ///
    /// `analog` and `digital` are channel-major and hold at least
    /// `channel_count * points_per_channel` samples.
    pub fn publish(
        &self,
        generation: u64,
        timestamp_nanos: u64,
        channel_count: u32,
        points_per_channel: u32,
        analog: &[f64],
        digital: &[bool],
    ) {
        let mut slot = self.slot.write();
        slot.frame.refill(
            timestamp_nanos,
            channel_count,
            points_per_channel,
            analog,
            digital,
        );
        slot.generation = generation;
    }

    /// Generation of the frame currently in the slot.
    pub fn generation(&self) -> u64 {
        self.slot.read().generation
    }

    /// Copy `channels` (in request order) out of the slot.
    ///
    /// Returns the slot's generation alongside the copy; `None` if a
    /// requested channel is out of range.
    pub fn copy_channels(&self, channels: &[u32]) -> Option<(u64, Frame)> {
        let slot = self.slot.read();
        slot.frame
            .select(channels)
            .map(|frame| (slot.generation, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot() {
        let published = PublishedFrame::new();
        assert_eq!(published.generation(), 0);
        let (generation, frame) = published.copy_channels(&[]).unwrap();
        assert_eq!(generation, 0);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_publish_then_copy() {
        let published = PublishedFrame::new();
        let analog = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let digital = [true, false, false, true, true, true];
        published.publish(3, 500, 3, 2, &analog, &digital);

        let (generation, frame) = published.copy_channels(&[2, 0]).unwrap();
        assert_eq!(generation, 3);
        assert_eq!(frame.timestamp_nanos(), 500);
        assert_eq!(frame.analog(0), Some(&[5.0, 6.0][..]));
        assert_eq!(frame.analog(1), Some(&[1.0, 2.0][..]));
        assert_eq!(frame.digital(1), Some(&[true, false][..]));
        assert!(published.copy_channels(&[3]).is_none());
    }

    #[test]
    fn test_publish_overwrites_previous_block() {
        let published = PublishedFrame::new();
        published.publish(1, 0, 1, 3, &[1.0, 1.0, 1.0], &[false; 3]);
        published.publish(2, 100, 1, 1, &[9.0, 9.0, 9.0], &[true; 3]);

        let (generation, frame) = published.copy_channels(&[0]).unwrap();
        assert_eq!(generation, 2);
        assert_eq!(frame.points_per_channel(), 1);
        assert_eq!(frame.analog(0), Some(&[9.0][..]));
    }
}
