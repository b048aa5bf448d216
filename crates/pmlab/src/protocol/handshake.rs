// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection handshake.
//!
//! ```text
//! client -> server:  num_channels u32 BE | num_channels x channel_id u32 BE
//! server -> client:  WELCOME_MARKER (17B, ASCII+NUL) | sampling_rate_hz u32 BE
//! ```
//!
//! The welcome marker is fixed-length and not length-prefixed.

use super::codec::CodecError;
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Marker opening the handshake reply (includes the trailing NUL).
pub const WELCOME_MARKER: &[u8; 17] = b"WELCOME HOME NEO\0";

/// Default upper bound on channels a client may request.
pub const DEFAULT_MAX_REQUESTED_CHANNELS: u32 = 1024;

/// Channel subscription sent by a client right after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Requested channel ids, in the order the client wants them delivered
    pub channels: Vec<u32>,
}

impl Handshake {
    pub fn new(channels: Vec<u32>) -> Self {
        Self { channels }
    }

    /// Serialize the handshake.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 4 * self.channels.len());
        buf.extend_from_slice(&(self.channels.len() as u32).to_be_bytes());
        for channel in &self.channels {
            buf.extend_from_slice(&channel.to_be_bytes());
        }
        buf
    }

    /// Write the handshake to a stream.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), CodecError> {
        writer.write_all(&self.encode())?;
        Ok(())
    }

    /// Read a handshake, rejecting empty requests and requests for more than
    /// `max_channels` channels before allocating anything.
    pub fn read_from<R: Read + ?Sized>(
        reader: &mut R,
        max_channels: u32,
    ) -> Result<Self, CodecError> {
        let count = reader.read_u32::<NetworkEndian>()?;
        if count == 0 {
            return Err(CodecError::InvalidHandshake(
                "client requested zero channels".to_string(),
            ));
        }
        if count > max_channels {
            return Err(CodecError::InvalidHandshake(format!(
                "client requested {} channels (max {})",
                count, max_channels
            )));
        }

        let mut channels = vec![0u32; count as usize];
        reader.read_u32_into::<NetworkEndian>(&mut channels)?;
        Ok(Self { channels })
    }

    /// Check every requested id against the source's channel range.
    pub fn validate(&self, channel_count: u32) -> Result<(), CodecError> {
        match self.channels.iter().find(|&&c| c >= channel_count) {
            Some(bad) => Err(CodecError::InvalidHandshake(format!(
                "channel {} out of range (source has {} channels)",
                bad, channel_count
            ))),
            None => Ok(()),
        }
    }
}

/// Server reply completing the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeReply {
    pub sampling_rate_hz: u32,
}

impl HandshakeReply {
    pub fn new(sampling_rate_hz: u32) -> Self {
        Self { sampling_rate_hz }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WELCOME_MARKER.len() + 4);
        buf.extend_from_slice(WELCOME_MARKER);
        buf.extend_from_slice(&self.sampling_rate_hz.to_be_bytes());
        buf
    }

    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), CodecError> {
        writer.write_all(WELCOME_MARKER)?;
        writer.write_u32::<NetworkEndian>(self.sampling_rate_hz)?;
        Ok(())
    }

    /// Read the reply, validating the welcome marker.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, CodecError> {
        let mut marker = [0u8; WELCOME_MARKER.len()];
        reader.read_exact(&mut marker)?;
        if &marker != WELCOME_MARKER {
            return Err(CodecError::BadMarker { what: "welcome" });
        }
        let sampling_rate_hz = reader.read_u32::<NetworkEndian>()?;
        Ok(Self { sampling_rate_hz })
    }
}
