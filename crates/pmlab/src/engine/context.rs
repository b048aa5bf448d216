// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! State shared by every worker of one server instance.

use super::published::PublishedFrame;
use crate::config::ServerConfig;
use crate::metrics::StreamMetrics;
use crate::sync::GenerationBarrier;
use std::sync::Arc;

/// Handles shared by the acquisition loop, the accept loop and all
/// handler/sender pairs.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub config: Arc<ServerConfig>,
    pub barrier: Arc<GenerationBarrier>,
    pub published: Arc<PublishedFrame>,
    pub metrics: Arc<StreamMetrics>,
    /// Channels delivered by the source
    pub channel_count: u32,
    /// Rate announced in the handshake reply
    pub sampling_rate_hz: u32,
}

impl StreamContext {
    pub fn new(config: ServerConfig, channel_count: u32, sampling_rate_hz: u32) -> Self {
        let barrier = GenerationBarrier::with_wait_timeout(config.wait_timeout());
        Self {
            config: Arc::new(config),
            barrier: Arc::new(barrier),
            published: Arc::new(PublishedFrame::new()),
            metrics: Arc::new(StreamMetrics::new()),
            channel_count,
            sampling_rate_hz,
        }
    }
}
