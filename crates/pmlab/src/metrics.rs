// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streaming server metrics.
//!
//! Lock-free counters shared by the accept loop, the acquisition loop and
//! every handler/sender pair.
//!
//! # Example
//!
//! ```
//! use pmlab::metrics::StreamMetrics;
//!
//! let metrics = StreamMetrics::new();
//! metrics.record_connection_accepted();
//! metrics.record_frame_sent(1024);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.connections_accepted, 1);
//! assert_eq!(snapshot.bytes_sent, 1024);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Counters for one server instance.
#[derive(Debug)]
pub struct StreamMetrics {
    // Connection metrics
    /// Total connections accepted
    connections_accepted: AtomicU64,

    /// Connections currently streaming or handshaking
    active_connections: AtomicUsize,

    /// Connections closed because of a bad handshake
    handshake_failures: AtomicU64,

    // Drop metrics
    /// Connections dropped because their buffer overflowed
    overflow_drops: AtomicU64,

    /// Socket write failures
    send_errors: AtomicU64,

    /// Rejected acknowledgments (programming errors)
    invariant_violations: AtomicU64,

    // Throughput metrics
    /// Generations published by the acquisition loop
    generations_published: AtomicU64,

    /// Data messages written to clients
    frames_sent: AtomicU64,

    /// Bytes written to clients (including framing)
    bytes_sent: AtomicU64,

    start_time: Instant,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            connections_accepted: AtomicU64::new(0),
            active_connections: AtomicUsize::new(0),
            handshake_failures: AtomicU64::new(0),
            overflow_drops: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            invariant_violations: AtomicU64::new(0),
            generations_published: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    pub fn record_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_handshake_failure(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow_drop(&self) {
        self.overflow_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invariant_violation(&self) {
        self.invariant_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generation_published(&self) {
        self.generations_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one data message of `bytes` bytes written to a client.
    pub fn record_frame_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops.load(Ordering::Relaxed)
    }

    pub fn generations_published(&self) -> u64 {
        self.generations_published.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            overflow_drops: self.overflow_drops.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            invariant_violations: self.invariant_violations.load(Ordering::Relaxed),
            generations_published: self.generations_published.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`StreamMetrics`].
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub active_connections: usize,
    pub handshake_failures: u64,
    pub overflow_drops: u64,
    pub send_errors: u64,
    pub invariant_violations: u64,
    pub generations_published: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub uptime_secs: f64,
}

impl MetricsSnapshot {
    /// Generations published per second since start.
    pub fn generation_rate(&self) -> f64 {
        if self.uptime_secs > 0.0 {
            self.generations_published as f64 / self.uptime_secs
        } else {
            0.0
        }
    }

    /// Bytes sent per second since start.
    pub fn byte_rate(&self) -> f64 {
        if self.uptime_secs > 0.0 {
            self.bytes_sent as f64 / self.uptime_secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generations={} ({:.1}/s) clients={} accepted={} frames_sent={} bytes_sent={} \
             handshake_failures={} overflow_drops={} send_errors={} invariant_violations={}",
            self.generations_published,
            self.generation_rate(),
            self.active_connections,
            self.connections_accepted,
            self.frames_sent,
            self.bytes_sent,
            self.handshake_failures,
            self.overflow_drops,
            self.send_errors,
            self.invariant_violations
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let metrics = StreamMetrics::new();
        metrics.record_connection_accepted();
        metrics.record_connection_accepted();
        metrics.record_connection_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.connections_accepted, 2);
        assert_eq!(snap.active_connections, 1);
    }

    #[test]
    fn test_drop_counters() {
        let metrics = StreamMetrics::new();
        metrics.record_overflow_drop();
        metrics.record_send_error();
        metrics.record_handshake_failure();
        metrics.record_invariant_violation();

        let snap = metrics.snapshot();
        assert_eq!(snap.overflow_drops, 1);
        assert_eq!(snap.send_errors, 1);
        assert_eq!(snap.handshake_failures, 1);
        assert_eq!(snap.invariant_violations, 1);
    }

    #[test]
    fn test_display_summary() {
        let metrics = StreamMetrics::new();
        metrics.record_generation_published();
        metrics.record_frame_sent(100);
        let line = metrics.snapshot().to_string();
        assert!(line.contains("generations=1"));
        assert!(line.contains("bytes_sent=100"));
    }

    #[test]
    fn test_rates_zero_uptime() {
        let snap = MetricsSnapshot::default();
        assert_eq!(snap.generation_rate(), 0.0);
        assert_eq!(snap.byte_rate(), 0.0);
    }
}
