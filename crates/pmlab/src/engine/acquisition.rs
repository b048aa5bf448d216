// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Acquisition loop: the single producer of the streaming engine.
//!
//! ```text
//! loop {
//!     await_ready()            wait until every Active handler acknowledged
//!     acquire()                read one block from the source
//!     publish(G+1)             overwrite the shared frame slot
//!     reset()                  open generation G+1, wake handlers
//! }
//! ```
//!
//! Any source error stops the loop and triggers process-wide shutdown.

use super::context::StreamContext;
use super::published::PublishedFrame;
use crate::metrics::StreamMetrics;
use crate::source::{SampleSource, SourceError};
use crate::sync::{GenerationBarrier, Readiness};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Fatal acquisition failures.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("sample source failed: {0}")]
    Source(#[from] SourceError),

    /// Source returned more points than requested
    #[error("source returned {returned} points, {requested} requested")]
    Overrun { returned: u32, requested: u32 },

    #[error("failed to spawn acquisition thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Generations published
    pub generations: u64,
    /// Points per channel acquired since start
    pub total_points: u64,
    /// Timestamp of the last published frame
    pub last_timestamp_nanos: u64,
    /// Calls that returned no data
    pub empty_reads: u64,
}

/// Single-threaded producer pacing itself on the generation barrier.
pub struct AcquisitionLoop {
    source: Box<dyn SampleSource>,
    barrier: Arc<GenerationBarrier>,
    published: Arc<PublishedFrame>,
    metrics: Arc<StreamMetrics>,
    points_per_channel: u32,
    timeout: Duration,
    analog: Vec<f64>,
    digital: Vec<bool>,
    stats: AcquisitionStats,
}

impl AcquisitionLoop {
    /// Build a loop feeding the slot, barrier and metrics of `ctx`.
    pub fn new(source: Box<dyn SampleSource>, ctx: &StreamContext) -> Self {
        let points_per_channel = ctx.config.points_per_channel;
        let len = source.channel_count() as usize * points_per_channel as usize;
        Self {
            source,
            barrier: Arc::clone(&ctx.barrier),
            published: Arc::clone(&ctx.published),
            metrics: Arc::clone(&ctx.metrics),
            points_per_channel,
            timeout: ctx.config.acquisition_timeout(),
            analog: vec![0.0; len],
            digital: vec![false; len],
            stats: AcquisitionStats::default(),
        }
    }

    /// Run on a dedicated named thread.
    pub fn spawn(
        self,
    ) -> Result<thread::JoinHandle<Result<AcquisitionStats, AcquisitionError>>, AcquisitionError>
    {
        thread::Builder::new()
            .name("pmlab-acquisition".to_string())
            .spawn(move || self.run())
            .map_err(AcquisitionError::Spawn)
    }

    /// Run until shutdown or a source failure.
    ///
    /// On failure the barrier is shut down before returning so every
    /// handler and the accept loop unwind.
    pub fn run(mut self) -> Result<AcquisitionStats, AcquisitionError> {
        log::info!(
            "[acquisition] started: {} channels @ {} Hz, {} points per block",
            self.source.channel_count(),
            self.source.sampling_rate_hz(),
            self.points_per_channel
        );

        let result = self.cycle_until_shutdown();
        match &result {
            Ok(stats) => log::info!(
                "[acquisition] stopped after {} generations",
                stats.generations
            ),
            Err(e) => {
                log::error!("[acquisition] fatal: {}", e);
                self.barrier.shutdown();
            }
        }
        result
    }

    fn cycle_until_shutdown(&mut self) -> Result<AcquisitionStats, AcquisitionError> {
        loop {
            if let Readiness::Shutdown = self.barrier.await_ready() {
                return Ok(self.stats);
            }

            let points = self.source.acquire(
                self.points_per_channel,
                self.timeout,
                &mut self.analog,
                &mut self.digital,
            )?;
            if points > self.points_per_channel {
                return Err(AcquisitionError::Overrun {
                    returned: points,
                    requested: self.points_per_channel,
                });
            }
            if points == 0 {
                self.stats.empty_reads += 1;
                continue;
            }

            self.publish(points);
        }
    }

    fn publish(&mut self, points: u32) {
        let timestamp = self.timestamp_nanos();
        let generation = self.barrier.generation() + 1;

        self.published.publish(
            generation,
            timestamp,
            self.source.channel_count(),
            points,
            &self.analog,
            &self.digital,
        );
        let opened = self.barrier.reset();
        debug_assert_eq!(opened, generation);

        self.metrics.record_generation_published();
        self.stats.generations += 1;
        self.stats.total_points += u64::from(points);
        self.stats.last_timestamp_nanos = timestamp;
        log::trace!(
            "[acquisition] generation {} published: {} points, t={}ns",
            generation,
            points,
            timestamp
        );
    }

    /// Time of the first sample of the next block, derived from the total
    /// point count so rounding never accumulates.
    fn timestamp_nanos(&self) -> u64 {
        let rate = u128::from(self.source.sampling_rate_hz().max(1));
        let nanos = u128::from(self.stats.total_points) * NANOS_PER_SEC / rate;
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::source::PatternSource;

    fn context(points_per_channel: u32) -> StreamContext {
        let config = ServerConfig {
            points_per_channel,
            wait_timeout_ms: 20,
            ..ServerConfig::loopback()
        };
        StreamContext::new(config, 3, 1000)
    }

    /// Source that returns nothing for `empty` calls, then fails.
    struct FlakySource {
        empty: u32,
    }

    impl SampleSource for FlakySource {
        fn channel_count(&self) -> u32 {
            1
        }

        fn sampling_rate_hz(&self) -> u32 {
            1000
        }

        fn acquire(
            &mut self,
            _max_points: u32,
            _timeout: Duration,
            _analog: &mut [f64],
            _digital: &mut [bool],
        ) -> Result<u32, SourceError> {
            if self.empty == 0 {
                return Err(SourceError::Timeout(Duration::from_secs(10)));
            }
            self.empty -= 1;
            Ok(0)
        }
    }

    #[test]
    fn test_source_fault_shuts_down_barrier() {
        let ctx = context(10);
        let source = PatternSource::new(3, 1000).with_fault_after(4);
        let result = AcquisitionLoop::new(Box::new(source), &ctx).run();

        assert!(matches!(
            result,
            Err(AcquisitionError::Source(SourceError::Device(_)))
        ));
        assert!(ctx.barrier.is_shutdown());
        assert_eq!(ctx.barrier.generation(), 4);
        assert_eq!(ctx.metrics.generations_published(), 4);
    }

    #[test]
    fn test_published_timestamps_follow_point_count() {
        let ctx = context(10);
        let source = PatternSource::new(3, 1000).with_fault_after(3);
        let _ = AcquisitionLoop::new(Box::new(source), &ctx).run();

        // 3 blocks of 10 points at 1 kHz: last block starts at 20 ms
        let (generation, frame) = ctx.published.copy_channels(&[0, 1, 2]).unwrap();
        assert_eq!(generation, 3);
        assert_eq!(frame.timestamp_nanos(), 20_000_000);
        assert_eq!(frame.points_per_channel(), 10);
        assert_eq!(frame.channel_count(), 3);
    }

    #[test]
    fn test_empty_reads_publish_nothing() {
        let ctx = context(10);
        let result = AcquisitionLoop::new(Box::new(FlakySource { empty: 3 }), &ctx).run();

        assert!(matches!(
            result,
            Err(AcquisitionError::Source(SourceError::Timeout(_)))
        ));
        assert_eq!(ctx.barrier.generation(), 0);
    }

    #[test]
    fn test_shutdown_stops_loop() {
        let ctx = context(10);
        let (handle, _) = ctx.barrier.join_participant();
        let source = PatternSource::new(3, 1000);
        let join = AcquisitionLoop::new(Box::new(source), &ctx)
            .spawn()
            .unwrap();

        // Participant never acknowledges: the loop parks on generation 1
        while ctx.barrier.generation() < 1 {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ctx.barrier.generation(), 1);

        ctx.barrier.shutdown();
        let stats = join.join().unwrap().unwrap();
        assert_eq!(stats.generations, 1);
        assert!(ctx.barrier.leave_participant(handle));
    }
}
