//! MQTT fixed-header framing
//!
//! A [`Frame`] is one control packet as it travels on the wire: the fixed
//! header byte plus the body that follows the variable-length "remaining
//! length" field. Nothing in here interprets the body; see
//! [`super::packets`] for the few packet layouts the shell builds or reads.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Largest value the four-byte remaining length encoding can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Default cap on a single inbound frame (header included).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// Errors raised by the protocol client and the frame codec
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Not connected")]
    NotConnected,
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    #[error("Invalid packet type in header {0:#04x}")]
    InvalidPacketType(u8),
    #[error("Malformed remaining length")]
    MalformedRemainingLength,
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },
    #[error("Malformed packet: {0}")]
    Malformed(String),
}

impl ProtocolError {
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::Malformed(message.into())
    }
}

/// MQTT 3.1.1 control packet types (upper nibble of the fixed header)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Resolve the packet type from a full fixed header byte
    pub fn from_header(header: u8) -> Result<Self, ProtocolError> {
        let packet_type = match header >> 4 {
            1 => PacketType::Connect,
            2 => PacketType::ConnAck,
            3 => PacketType::Publish,
            4 => PacketType::PubAck,
            5 => PacketType::PubRec,
            6 => PacketType::PubRel,
            7 => PacketType::PubComp,
            8 => PacketType::Subscribe,
            9 => PacketType::SubAck,
            10 => PacketType::Unsubscribe,
            11 => PacketType::UnsubAck,
            12 => PacketType::PingReq,
            13 => PacketType::PingResp,
            14 => PacketType::Disconnect,
            _ => return Err(ProtocolError::InvalidPacketType(header)),
        };
        Ok(packet_type)
    }
}

/// One MQTT control packet: fixed header byte and opaque body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: u8,
    body: Bytes,
}

impl Frame {
    pub fn new(header: u8, body: impl Into<Bytes>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    /// PINGREQ, used by the keep-alive timer
    pub fn pingreq() -> Self {
        Self::new(0xC0, Bytes::new())
    }

    pub fn disconnect() -> Self {
        Self::new(0xE0, Bytes::new())
    }

    pub fn header(&self) -> u8 {
        self.header
    }

    /// Lower nibble of the fixed header
    pub fn flags(&self) -> u8 {
        self.header & 0x0F
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Identify this frame. Fails for the reserved types 0 and 15.
    pub fn packet_type(&self) -> Result<PacketType, ProtocolError> {
        PacketType::from_header(self.header)
    }

    /// Number of bytes [`Frame::encode`] will write
    pub fn encoded_len(&self) -> usize {
        1 + remaining_length_len(self.body.len()) + self.body.len()
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.reserve(self.encoded_len());
        dst.put_u8(self.header);
        encode_remaining_length(dst, self.body.len())?;
        dst.put_slice(&self.body);
        Ok(())
    }

    /// Pull one complete frame off the front of `src`.
    ///
    /// Returns `Ok(None)` when `src` does not yet hold a whole frame; the
    /// buffer is left untouched in that case so the caller can read more and
    /// retry.
    pub fn decode(src: &mut BytesMut, max_size: usize) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < 2 {
            return Ok(None);
        }

        let Some((remaining, length_bytes)) = decode_remaining_length(&src[1..])? else {
            return Ok(None);
        };

        let header_len = 1 + length_bytes;
        let total = header_len + remaining;
        if total > max_size {
            return Err(ProtocolError::FrameTooLarge {
                size: total,
                max: max_size,
            });
        }

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let header = src[0];
        src.advance(header_len);
        let body = src.split_to(remaining).freeze();
        Ok(Some(Frame { header, body }))
    }
}

/// Write `len` using the MQTT variable-length integer encoding
pub fn encode_remaining_length(dst: &mut BytesMut, mut len: usize) -> Result<(), ProtocolError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_REMAINING_LENGTH,
        });
    }

    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        dst.put_u8(byte);
        if len == 0 {
            return Ok(());
        }
    }
}

/// Decode a remaining length from the start of `bytes`.
///
/// Returns the value and how many bytes it occupied, or `None` if the
/// encoding continues past the end of `bytes`.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;

    for (index, byte) in bytes.iter().enumerate() {
        if index >= 4 {
            return Err(ProtocolError::MalformedRemainingLength);
        }
        value += (*byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
        multiplier *= 128;
    }

    if bytes.len() >= 4 {
        Err(ProtocolError::MalformedRemainingLength)
    } else {
        Ok(None)
    }
}

fn remaining_length_len(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}
