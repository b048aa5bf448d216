// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sender worker: drains one client buffer onto its socket.
//!
//! The only thread that writes data messages to a client. It blocks in
//! `pop` or in the socket write, never on the barrier, so a slow client
//! only fills its own buffer.

use super::context::StreamContext;
use crate::protocol::write_data_message;
use crate::sync::{ClientBuffer, PopOutcome, WorkerHandle};
use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Counters reported when the sender exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

/// Handle to a running sender thread.
#[derive(Debug)]
pub struct SenderWorker {
    worker: WorkerHandle,
    link_up: Arc<AtomicBool>,
    thread: thread::JoinHandle<SenderStats>,
}

impl SenderWorker {
    /// Start draining `buffer` into `stream` on a named thread.
    pub fn spawn(
        worker: WorkerHandle,
        stream: TcpStream,
        buffer: Arc<ClientBuffer>,
        ctx: StreamContext,
    ) -> io::Result<Self> {
        let link_up = Arc::new(AtomicBool::new(true));
        let link = Arc::clone(&link_up);

        let thread = thread::Builder::new()
            .name(format!("pmlab-sender-{}", worker.id()))
            .spawn(move || send_loop(worker, stream, &buffer, &ctx, &link))?;

        Ok(Self {
            worker,
            link_up,
            thread,
        })
    }

    /// `false` once a write failed; the connection is then unusable.
    pub fn is_link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    /// Wait for the thread to exit.
    pub fn join(self) -> SenderStats {
        match self.thread.join() {
            Ok(stats) => stats,
            Err(_) => {
                log::error!("[sender {}] thread panicked", self.worker);
                SenderStats::default()
            }
        }
    }
}

fn send_loop<W: Write>(
    worker: WorkerHandle,
    mut stream: W,
    buffer: &ClientBuffer,
    ctx: &StreamContext,
    link_up: &AtomicBool,
) -> SenderStats {
    let mut stats = SenderStats::default();
    let mut scratch = Vec::new();
    let wait = ctx.config.wait_timeout();

    loop {
        match buffer.pop(wait, || ctx.barrier.is_shutdown()) {
            PopOutcome::Frame(frame) => {
                match write_data_message(&mut stream, &frame, &mut scratch) {
                    Ok(bytes) => {
                        stats.frames_sent += 1;
                        stats.bytes_sent += bytes as u64;
                        ctx.metrics.record_frame_sent(bytes);
                    }
                    Err(e) => {
                        // A closed buffer means the handler shut the socket down
                        if !buffer.is_closed() {
                            if is_disconnect(&e) {
                                log::info!("[sender {}] peer disconnected: {}", worker, e);
                            } else {
                                log::warn!("[sender {}] write failed: {}", worker, e);
                                ctx.metrics.record_send_error();
                            }
                        }
                        link_up.store(false, Ordering::Release);
                        break;
                    }
                }
            }
            PopOutcome::Closed | PopOutcome::Empty => break,
        }
    }

    log::debug!(
        "[sender {}] exiting after {} frames ({} bytes)",
        worker,
        stats.frames_sent,
        stats.bytes_sent
    );
    stats
}

/// Errors raised when the client went away rather than the link failing.
fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::protocol::{Frame, FrameDecoder};
    use std::io::Cursor;

    fn context() -> StreamContext {
        let config = ServerConfig {
            wait_timeout_ms: 10,
            ..ServerConfig::loopback()
        };
        StreamContext::new(config, 2, 1000)
    }

    struct FailingWriter(io::ErrorKind);

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "write refused"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_drains_buffer_until_closed() {
        let ctx = context();
        let (worker, _) = ctx.barrier.join_participant();
        let buffer = ClientBuffer::new(8);
        for ts in 0..3 {
            buffer.push(Frame::new(ts, 1, 2, vec![1.0, 2.0], vec![true, false]).unwrap());
        }
        buffer.close();

        let link = AtomicBool::new(true);
        let mut out = Vec::new();
        let stats = send_loop(worker, &mut out, &buffer, &ctx, &link);

        assert_eq!(stats.frames_sent, 3);
        assert_eq!(stats.bytes_sent, out.len() as u64);
        assert!(link.load(Ordering::Acquire));

        let mut decoder = FrameDecoder::default();
        let mut cursor = Cursor::new(out);
        let stamps: Vec<u64> = std::iter::from_fn(|| decoder.read_frame(&mut cursor).unwrap())
            .map(|f| f.timestamp_nanos())
            .collect();
        assert_eq!(stamps, vec![0, 1, 2]);
        assert_eq!(ctx.metrics.snapshot().frames_sent, 3);
    }

    #[test]
    fn test_write_failure_drops_link() {
        let ctx = context();
        let (worker, _) = ctx.barrier.join_participant();
        let buffer = ClientBuffer::new(4);
        buffer.push(Frame::new(0, 1, 1, vec![0.5], vec![false]).unwrap());

        let link = AtomicBool::new(true);
        let writer = FailingWriter(io::ErrorKind::Other);
        let stats = send_loop(worker, writer, &buffer, &ctx, &link);

        assert_eq!(stats.frames_sent, 0);
        assert!(!link.load(Ordering::Acquire));
        assert_eq!(ctx.metrics.snapshot().send_errors, 1);
    }

    #[test]
    fn test_peer_disconnect_is_not_send_error() {
        for kind in [
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
        ] {
            let ctx = context();
            let (worker, _) = ctx.barrier.join_participant();
            let buffer = ClientBuffer::new(4);
            buffer.push(Frame::new(0, 1, 1, vec![0.5], vec![false]).unwrap());

            let link = AtomicBool::new(true);
            send_loop(worker, FailingWriter(kind), &buffer, &ctx, &link);

            assert!(!link.load(Ordering::Acquire), "{:?}", kind);
            assert_eq!(ctx.metrics.snapshot().send_errors, 0, "{:?}", kind);
        }
    }

    #[test]
    fn test_exits_on_shutdown() {
        let ctx = context();
        let (worker, _) = ctx.barrier.join_participant();
        let buffer = ClientBuffer::new(4);
        ctx.barrier.shutdown();

        let link = AtomicBool::new(true);
        let stats = send_loop(worker, Vec::new(), &buffer, &ctx, &link);
        assert_eq!(stats, SenderStats::default());
    }
}
