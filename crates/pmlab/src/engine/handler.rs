// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handler worker: one per client connection.
//!
//! # State Machine
//!
//! ```text
//!   Handshaking ──ok──► Streaming ──(shutdown | overflow | link down | ack rejected)──► Closing
//!        │                                                                               ▲
//!        └──────────────────────────── protocol error ───────────────────────────────────┘
//! ```
//!
//! While streaming, the handler copies its channel subset out of every
//! published frame into the client buffer and acknowledges the generation.
//! It never writes to the socket itself; the paired [`SenderWorker`] does.
//! A full buffer closes the connection without acknowledging, which removes
//! the client from the barrier instead of stalling the producer.

use super::context::StreamContext;
use super::sender::{SenderStats, SenderWorker};
use crate::protocol::{CodecError, Handshake, HandshakeReply};
use crate::sync::{BarrierError, ClientBuffer, GenerationWait, PushOutcome, WorkerHandle};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use thiserror::Error;

/// Why a streaming connection was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Process-wide shutdown
    Shutdown,
    /// Client buffer saturated
    Overflow { generation: u64 },
    /// Sender failed to write to the socket
    LinkDown,
    /// Barrier rejected an acknowledgment
    InvariantViolation(BarrierError),
    /// Published frame did not match the observed generation
    StaleFrame { expected: u64, published: u64 },
}

/// Errors that end a connection before it starts streaming.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] CodecError),

    #[error("socket setup failed: {0}")]
    Io(#[from] io::Error),
}

/// Summary of a finished streaming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReport {
    pub worker: WorkerHandle,
    pub channels: Vec<u32>,
    pub reason: CloseReason,
    pub generations_acknowledged: u64,
    pub sender: SenderStats,
    /// Frames still queued when the connection closed
    pub frames_discarded: usize,
}

/// Per-connection worker driving the handshake and the streaming loop.
#[derive(Debug)]
pub struct HandlerWorker {
    stream: TcpStream,
    peer: SocketAddr,
    ctx: StreamContext,
}

impl HandlerWorker {
    pub fn new(stream: TcpStream, peer: SocketAddr, ctx: StreamContext) -> Self {
        Self { stream, peer, ctx }
    }

    /// Serve the connection until it closes.
    pub fn run(mut self) -> Result<HandlerReport, HandlerError> {
        let channels = match self.handshake() {
            Ok(channels) => channels,
            Err(e) => {
                self.ctx.metrics.record_handshake_failure();
                log::warn!("[handler {}] {}", self.peer, e);
                let _ = self.stream.shutdown(Shutdown::Both);
                return Err(e);
            }
        };

        let (worker, joined_at) = self.ctx.barrier.join_participant();
        match self.start_streaming(worker, joined_at, &channels) {
            Ok(report) => Ok(report),
            Err(e) => {
                log::warn!("[handler {}] {}: {}", worker, self.peer, e);
                self.ctx.barrier.leave_participant(worker);
                let _ = self.stream.shutdown(Shutdown::Both);
                Err(e)
            }
        }
    }

    /// Read and validate the channel request.
    ///
    /// Requests whose frames would exceed `max_message_size` are refused
    /// along with oversized channel lists.
    fn handshake(&mut self) -> Result<Vec<u32>, HandlerError> {
        let config = &self.ctx.config;
        self.stream
            .set_read_timeout(Some(config.handshake_timeout()))?;

        let max_channels = config
            .max_requested_channels
            .min(config.max_channels_per_message());
        let request = Handshake::read_from(&mut self.stream, max_channels)?;
        request.validate(self.ctx.channel_count)?;

        self.stream.set_read_timeout(None)?;
        Ok(request.channels)
    }

    fn start_streaming(
        &mut self,
        worker: WorkerHandle,
        joined_at: u64,
        channels: &[u32],
    ) -> Result<HandlerReport, HandlerError> {
        HandshakeReply::new(self.ctx.sampling_rate_hz).write_to(&mut self.stream)?;

        let buffer = Arc::new(ClientBuffer::new(self.ctx.config.buffer_capacity));
        let sender = SenderWorker::spawn(
            worker,
            self.stream.try_clone()?,
            Arc::clone(&buffer),
            self.ctx.clone(),
        )?;

        log::info!(
            "[handler {}] {} streaming channels {:?} from generation {}",
            worker,
            self.peer,
            channels,
            joined_at + 1
        );

        let (reason, acknowledged) =
            self.stream_frames(worker, joined_at, channels, &buffer, &sender);
        Ok(self.close(worker, channels, reason, acknowledged, &buffer, sender))
    }

    /// Copy, enqueue and acknowledge every generation until a close reason.
    fn stream_frames(
        &self,
        worker: WorkerHandle,
        joined_at: u64,
        channels: &[u32],
        buffer: &ClientBuffer,
        sender: &SenderWorker,
    ) -> (CloseReason, u64) {
        let barrier = &self.ctx.barrier;
        let mut last_seen = joined_at;
        let mut acknowledged = 0u64;

        loop {
            if !sender.is_link_up() {
                return (CloseReason::LinkDown, acknowledged);
            }

            let generation = match barrier.wait_for_generation(last_seen) {
                GenerationWait::Advanced(generation) => generation,
                GenerationWait::TimedOut => continue,
                GenerationWait::Shutdown => return (CloseReason::Shutdown, acknowledged),
            };

            // Channels were validated against the source at handshake time
            let Some((published, frame)) = self.ctx.published.copy_channels(channels) else {
                return (
                    CloseReason::StaleFrame {
                        expected: generation,
                        published: self.ctx.published.generation(),
                    },
                    acknowledged,
                );
            };
            if published != generation {
                return (
                    CloseReason::StaleFrame {
                        expected: generation,
                        published,
                    },
                    acknowledged,
                );
            }

            if buffer.push(frame) == PushOutcome::Overflow {
                return (CloseReason::Overflow { generation }, acknowledged);
            }

            if let Err(e) = barrier.acknowledge(worker, generation) {
                return (CloseReason::InvariantViolation(e), acknowledged);
            }
            acknowledged += 1;
            last_seen = generation;
        }
    }

    /// Leave the barrier, stop the sender and release the buffer.
    fn close(
        &self,
        worker: WorkerHandle,
        channels: &[u32],
        reason: CloseReason,
        generations_acknowledged: u64,
        buffer: &ClientBuffer,
        sender: SenderWorker,
    ) -> HandlerReport {
        self.ctx.barrier.leave_participant(worker);

        match &reason {
            CloseReason::Shutdown => {
                log::debug!("[handler {}] closing on shutdown", worker)
            }
            CloseReason::Overflow { generation } => {
                self.ctx.metrics.record_overflow_drop();
                log::warn!(
                    "[handler {}] {} dropped: buffer full at generation {} ({} frames queued)",
                    worker,
                    self.peer,
                    generation,
                    buffer.len()
                );
            }
            CloseReason::LinkDown => {
                log::info!("[handler {}] {} disconnected", worker, self.peer)
            }
            CloseReason::InvariantViolation(e) => {
                self.ctx.metrics.record_invariant_violation();
                log::error!("[handler {}] internal error: {}", worker, e);
            }
            CloseReason::StaleFrame { expected, published } => {
                self.ctx.metrics.record_invariant_violation();
                log::error!(
                    "[handler {}] internal error: woke for generation {} but slot holds {}",
                    worker,
                    expected,
                    published
                );
            }
        }

        // Release a sender blocked in write before joining it
        buffer.close();
        let _ = self.stream.shutdown(Shutdown::Both);
        let sender_stats = sender.join();
        let frames_discarded = buffer.drain_and_free();

        HandlerReport {
            worker,
            channels: channels.to_vec(),
            reason,
            generations_acknowledged,
            sender: sender_stats,
            frames_discarded,
        }
    }
}
