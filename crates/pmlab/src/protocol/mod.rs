// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire protocol shared by the daemon and its clients.
//!
//! - `frame` - Sample block data model
//! - `handshake` - Channel subscription and welcome reply
//! - `codec` - Data message framing and payload encoding
//!
//! All functions here are pure: no shared state, usable from any thread.

pub mod codec;
pub mod frame;
pub mod handshake;

pub use codec::{
    decode_payload, encode_data_message, encode_data_message_into, encode_payload,
    encode_payload_into, payload_len, write_data_message, CodecError, FrameDecoder,
    BYTES_PER_POINT, DATA_MAGIC, DEFAULT_MAX_MESSAGE_SIZE, LENGTH_PREFIX_SIZE, PAYLOAD_HEADER_SIZE,
};
pub use frame::{Frame, FrameError};
pub use handshake::{Handshake, HandshakeReply, DEFAULT_MAX_REQUESTED_CHANNELS, WELCOME_MARKER};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_distinct() {
        assert_ne!(&DATA_MAGIC[..], &WELCOME_MARKER[..]);
        assert_eq!(LENGTH_PREFIX_SIZE, 4);
    }
}
