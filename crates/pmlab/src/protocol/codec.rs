// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data message framing for sample blocks.
//!
//! Every frame sent to a client is wrapped in a data message:
//!
//! ```text
//! +------------------------------+------------------+-----------------+
//! | DATA_MAGIC (21B, ASCII+NUL)  | Length (4B BE)   | Payload         |
//! +------------------------------+------------------+-----------------+
//! ```
//!
//! # Payload Format
//!
//! All integers and floats are big-endian (network byte order):
//!
//! ```text
//! +---------------------+--------------------+--------------------------+
//! | timestamp_nanos u64 | channel_count u32  | points_per_channel u32   |
//! +---------------------+--------------------+--------------------------+
//! | per channel, in request order:                                      |
//! |   points_per_channel x f64 analog | points_per_channel x u8 digital |
//! +---------------------------------------------------------------------+
//! ```
//!
//! Digital samples are encoded as `0` or `1`; any other byte is rejected.

use super::frame::Frame;
use byteorder::{ByteOrder, NetworkEndian};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Marker preceding every data message (includes the trailing NUL).
pub const DATA_MAGIC: &[u8; 21] = b"THE MATRIX HAS YOU!!\0";

/// Size of the length prefix following [`DATA_MAGIC`].
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Fixed payload header: timestamp + channel count + points per channel.
pub const PAYLOAD_HEADER_SIZE: usize = 16;

/// Wire bytes per sample point (one f64 + one digital byte).
pub const BYTES_PER_POINT: usize = 9;

/// Default maximum payload size accepted by the decoder (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Wire protocol errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Socket or stream I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A fixed marker did not match
    #[error("bad {what} marker")]
    BadMarker { what: &'static str },

    /// Length prefix exceeds the configured maximum
    #[error("message too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: usize },

    /// Payload structure is inconsistent
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Client handshake is not acceptable
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),
}

/// Payload size in bytes for a frame.
pub fn payload_len(frame: &Frame) -> usize {
    PAYLOAD_HEADER_SIZE + frame.sample_count() * BYTES_PER_POINT
}

/// Append the serialized payload of `frame` to `buf`.
pub fn encode_payload_into(frame: &Frame, buf: &mut Vec<u8>) {
    let start = buf.len();
    buf.resize(start + payload_len(frame), 0);
    let out = &mut buf[start..];

    NetworkEndian::write_u64(&mut out[0..8], frame.timestamp_nanos());
    NetworkEndian::write_u32(&mut out[8..12], frame.channel_count());
    NetworkEndian::write_u32(&mut out[12..16], frame.points_per_channel());

    let points = frame.points_per_channel() as usize;
    let mut pos = PAYLOAD_HEADER_SIZE;
    for channel in 0..frame.channel_count() {
        let (Some(analog), Some(digital)) = (frame.analog(channel), frame.digital(channel)) else {
            break;
        };
        NetworkEndian::write_f64_into(analog, &mut out[pos..pos + points * 8]);
        pos += points * 8;
        for (slot, &bit) in out[pos..pos + points].iter_mut().zip(digital) {
            *slot = u8::from(bit);
        }
        pos += points;
    }
}

/// Serialize the payload of `frame`.
pub fn encode_payload(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload_len(frame));
    encode_payload_into(frame, &mut buf);
    buf
}

/// Reconstruct a frame from a payload.
pub fn decode_payload(bytes: &[u8]) -> Result<Frame, CodecError> {
    if bytes.len() < PAYLOAD_HEADER_SIZE {
        return Err(CodecError::Malformed(format!(
            "payload of {} bytes is shorter than the {}-byte header",
            bytes.len(),
            PAYLOAD_HEADER_SIZE
        )));
    }

    let timestamp_nanos = NetworkEndian::read_u64(&bytes[0..8]);
    let channel_count = NetworkEndian::read_u32(&bytes[8..12]);
    let points_per_channel = NetworkEndian::read_u32(&bytes[12..16]);

    let samples = u64::from(channel_count) * u64::from(points_per_channel);
    let expected = samples
        .checked_mul(BYTES_PER_POINT as u64)
        .and_then(|n| n.checked_add(PAYLOAD_HEADER_SIZE as u64));
    if expected != Some(bytes.len() as u64) {
        return Err(CodecError::Malformed(format!(
            "{} channels x {} points does not fit a {}-byte payload",
            channel_count,
            points_per_channel,
            bytes.len()
        )));
    }

    let points = points_per_channel as usize;
    let samples = samples as usize;
    let mut analog = vec![0.0f64; samples];
    let mut digital = Vec::with_capacity(samples);

    let mut pos = PAYLOAD_HEADER_SIZE;
    for channel in 0..channel_count as usize {
        let dest = &mut analog[channel * points..(channel + 1) * points];
        NetworkEndian::read_f64_into(&bytes[pos..pos + points * 8], dest);
        pos += points * 8;
        for &byte in &bytes[pos..pos + points] {
            match byte {
                0 => digital.push(false),
                1 => digital.push(true),
                other => {
                    return Err(CodecError::Malformed(format!(
                        "digital sample byte {:#04x} on channel {}",
                        other, channel
                    )))
                }
            }
        }
        pos += points;
    }

    Frame::new(
        timestamp_nanos,
        channel_count,
        points_per_channel,
        analog,
        digital,
    )
    .map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Append a complete data message (magic + length + payload) to `buf`.
pub fn encode_data_message_into(frame: &Frame, buf: &mut Vec<u8>) {
    let len = payload_len(frame) as u32;
    buf.reserve(DATA_MAGIC.len() + LENGTH_PREFIX_SIZE + len as usize);
    buf.extend_from_slice(DATA_MAGIC);
    buf.extend_from_slice(&len.to_be_bytes());
    encode_payload_into(frame, buf);
}

/// Encode a complete data message.
pub fn encode_data_message(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_data_message_into(frame, &mut buf);
    buf
}

/// Write one data message, using `scratch` as the staging buffer.
///
/// Returns the number of bytes written.
pub fn write_data_message<W: Write + ?Sized>(
    writer: &mut W,
    frame: &Frame,
    scratch: &mut Vec<u8>,
) -> io::Result<usize> {
    scratch.clear();
    encode_data_message_into(frame, scratch);
    writer.write_all(scratch)?;
    Ok(scratch.len())
}

/// Blocking decoder for a stream of data messages.
///
/// Keeps a reusable payload buffer and decode statistics.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Maximum accepted payload size (anti-OOM protection)
    max_size: usize,

    /// Reusable payload buffer
    buffer: Vec<u8>,

    /// Statistics: frames decoded
    frames_decoded: u64,

    /// Statistics: payload bytes decoded
    bytes_decoded: u64,

    /// Statistics: messages rejected (too large or malformed)
    frames_rejected: u64,
}

impl FrameDecoder {
    /// Create a decoder with the given maximum payload size.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            buffer: Vec::new(),
            frames_decoded: 0,
            bytes_decoded: 0,
            frames_rejected: 0,
        }
    }

    /// Create a decoder with the default maximum (16 MB).
    pub fn with_default_max() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Read the next data message from `reader`.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - a complete message was decoded
    /// - `Ok(None)` - the peer closed the stream at a message boundary
    /// - `Err(e)` - I/O error, truncated message or protocol error
    pub fn read_frame<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<Frame>, CodecError> {
        let mut magic = [0u8; DATA_MAGIC.len()];
        if !read_exact_or_eof(reader, &mut magic)? {
            return Ok(None);
        }
        if &magic != DATA_MAGIC {
            self.frames_rejected += 1;
            return Err(CodecError::BadMarker { what: "data" });
        }

        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > self.max_size {
            self.frames_rejected += 1;
            return Err(CodecError::TooLarge {
                len,
                max: self.max_size,
            });
        }

        self.buffer.resize(len, 0);
        reader.read_exact(&mut self.buffer)?;

        match decode_payload(&self.buffer) {
            Ok(frame) => {
                self.frames_decoded += 1;
                self.bytes_decoded += len as u64;
                Ok(Some(frame))
            }
            Err(e) => {
                self.frames_rejected += 1;
                Err(e)
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_default_max()
    }
}

/// Fill `buf` completely, or report a clean EOF before the first byte.
///
/// Returns `Ok(false)` on EOF at offset 0; EOF after a partial read is an
/// `UnexpectedEof` error.
pub(crate) fn read_exact_or_eof<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed inside a message",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

// ============================================================================
// Tests
// ============================================================================
