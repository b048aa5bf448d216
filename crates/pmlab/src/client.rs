// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking client for the streaming server.
//!
//! # Example
//!
//! ```no_run
//! use pmlab::client::Client;
//!
//! let mut client = Client::connect("127.0.0.1:12345", &[0, 2])?;
//! println!("sampling at {} Hz", client.sampling_rate_hz());
//! while let Some(frame) = client.read_frame()? {
//!     println!("t={}ns, {} points", frame.timestamp_nanos(), frame.points_per_channel());
//! }
//! # Ok::<(), pmlab::protocol::CodecError>(())
//! ```

use crate::protocol::{CodecError, Frame, FrameDecoder, Handshake, HandshakeReply};
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Subscribed connection to a streaming server.
#[derive(Debug)]
pub struct Client {
    reader: BufReader<TcpStream>,
    decoder: FrameDecoder,
    channels: Vec<u32>,
    sampling_rate_hz: u32,
}

impl Client {
    /// Connect and subscribe to `channels` (delivered in this order).
    pub fn connect<A: ToSocketAddrs>(addr: A, channels: &[u32]) -> Result<Self, CodecError> {
        let stream = TcpStream::connect(addr)?;
        Self::handshake(stream, channels)
    }

    /// Connect with a bound on the TCP connect.
    pub fn connect_timeout(
        addr: &SocketAddr,
        channels: &[u32],
        timeout: Duration,
    ) -> Result<Self, CodecError> {
        let stream = TcpStream::connect_timeout(addr, timeout)?;
        Self::handshake(stream, channels)
    }

    fn handshake(mut stream: TcpStream, channels: &[u32]) -> Result<Self, CodecError> {
        let _ = stream.set_nodelay(true);
        Handshake::new(channels.to_vec()).write_to(&mut stream)?;

        let mut reader = BufReader::new(stream);
        let reply = HandshakeReply::read_from(&mut reader)?;
        log::debug!(
            "[client] subscribed to {:?} at {} Hz",
            channels,
            reply.sampling_rate_hz
        );

        Ok(Self {
            reader,
            decoder: FrameDecoder::default(),
            channels: channels.to_vec(),
            sampling_rate_hz: reply.sampling_rate_hz,
        })
    }

    pub fn sampling_rate_hz(&self) -> u32 {
        self.sampling_rate_hz
    }

    pub fn channels(&self) -> &[u32] {
        &self.channels
    }

    /// Override the decoder's payload size limit.
    pub fn set_max_message_size(&mut self, max_size: usize) {
        self.decoder = FrameDecoder::new(max_size);
    }

    /// Bound every blocking read; `None` waits forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), CodecError> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the server closed the connection between
    /// messages. A frame whose channel count differs from the subscription
    /// is rejected.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        let Some(frame) = self.decoder.read_frame(&mut self.reader)? else {
            return Ok(None);
        };
        if frame.channel_count() as usize != self.channels.len() {
            return Err(CodecError::Malformed(format!(
                "frame carries {} channels, subscribed to {}",
                frame.channel_count(),
                self.channels.len()
            )));
        }
        Ok(Some(frame))
    }

    /// Frames decoded so far.
    pub fn frames_received(&self) -> u64 {
        self.decoder.frames_decoded()
    }

    /// Handle that can close the connection from another thread, waking a
    /// blocked [`read_frame`](Self::read_frame) with end-of-stream.
    pub fn interrupt_handle(&self) -> Result<InterruptHandle, CodecError> {
        Ok(InterruptHandle {
            stream: self.reader.get_ref().try_clone()?,
        })
    }

    /// Close both directions of the connection.
    pub fn close(self) -> Result<(), CodecError> {
        self.reader.get_ref().shutdown(Shutdown::Both)?;
        Ok(())
    }
}

/// Cross-thread shutdown of a [`Client`] connection.
#[derive(Debug)]
pub struct InterruptHandle {
    stream: TcpStream,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_data_message, DATA_MAGIC};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Minimal server speaking the wire protocol by hand.
    fn serve_once<F>(respond: F) -> SocketAddr
    where
        F: FnOnce(TcpStream, Vec<u32>) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = Handshake::read_from(&mut stream, 64).unwrap();
            respond(stream, request.channels);
        });
        addr
    }

    #[test]
    fn test_connect_and_read() {
        let addr = serve_once(|mut stream, channels| {
            assert_eq!(channels, vec![1]);
            HandshakeReply::new(30_000).write_to(&mut stream).unwrap();
            let frame = Frame::new(5, 1, 2, vec![0.5, 0.6], vec![true, false]).unwrap();
            stream.write_all(&encode_data_message(&frame)).unwrap();
        });

        let mut client = Client::connect(addr, &[1]).unwrap();
        assert_eq!(client.sampling_rate_hz(), 30_000);
        assert_eq!(client.channels(), &[1]);

        let frame = client.read_frame().unwrap().unwrap();
        assert_eq!(frame.timestamp_nanos(), 5);
        assert_eq!(frame.analog(0), Some(&[0.5, 0.6][..]));
        assert!(client.read_frame().unwrap().is_none());
        assert_eq!(client.frames_received(), 1);
    }

    #[test]
    fn test_bad_welcome_rejected() {
        let addr = serve_once(|mut stream, _| {
            stream.write_all(&[0u8; 21]).unwrap();
        });
        let err = Client::connect(addr, &[0]).unwrap_err();
        assert!(matches!(err, CodecError::BadMarker { what: "welcome" }));
    }

    #[test]
    fn test_channel_count_mismatch_rejected() {
        let addr = serve_once(|mut stream, _| {
            HandshakeReply::new(1000).write_to(&mut stream).unwrap();
            let frame = Frame::new(0, 2, 1, vec![0.0, 0.0], vec![false, false]).unwrap();
            stream.write_all(&encode_data_message(&frame)).unwrap();
        });

        let mut client = Client::connect(addr, &[0]).unwrap();
        assert!(matches!(client.read_frame(), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_truncated_message_is_error() {
        let addr = serve_once(|mut stream, _| {
            HandshakeReply::new(1000).write_to(&mut stream).unwrap();
            stream.write_all(DATA_MAGIC).unwrap();
            stream.write_all(&[0, 0]).unwrap();
        });

        let mut client = Client::connect(addr, &[0]).unwrap();
        assert!(matches!(client.read_frame(), Err(CodecError::Io(_))));
    }

    #[test]
    fn test_close_shuts_socket() {
        let (tx, rx) = std::sync::mpsc::channel();
        let addr = serve_once(move |mut stream, _| {
            HandshakeReply::new(1000).write_to(&mut stream).unwrap();
            let mut buf = [0u8; 1];
            tx.send(stream.read(&mut buf).unwrap()).unwrap();
        });

        let client = Client::connect(addr, &[0]).unwrap();
        client.close().unwrap();
        assert_eq!(rx.recv().unwrap(), 0);
    }

    #[test]
    fn test_interrupt_unblocks_reader() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let addr = serve_once(move |mut stream, _| {
            HandshakeReply::new(1000).write_to(&mut stream).unwrap();
            // Hold the connection open without sending data
            let _ = rx.recv();
        });

        let mut client = Client::connect(addr, &[0]).unwrap();
        let interrupt = client.interrupt_handle().unwrap();
        let waker = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(50));
            interrupt.interrupt();
        });

        assert!(client.read_frame().unwrap().is_none());
        waker.join().unwrap();
        drop(tx);
    }
}
