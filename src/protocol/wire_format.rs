//! Wire format encoding and decoding.
//!
//! Every frame starts with a 6-byte header:
//! ```text
//! ┌──────────┬───────┬──────────┬─────────────────────┐
//! │ Length   │ Type  │ Encoding │ Payload             │
//! │ 4 bytes  │ 1 byte│ 1 byte   │ Length - 2 bytes    │
//! │ uint32 BE│       │          │                     │
//! └──────────┴───────┴──────────┴─────────────────────┘
//! ```
//!
//! `Length` covers the type byte, the encoding byte and the payload, so it is never
//! smaller than 2. All multi-byte integers are Big Endian.

use crate::error::{Error, Result};

/// Header size in bytes (fixed, exactly 6).
pub const HEADER_SIZE: usize = 6;

/// Bytes counted by `Length` that are not payload (type + encoding).
pub const LENGTH_OVERHEAD: u32 = 2;

/// Smallest legal `Length` value (empty payload).
pub const MIN_FRAME_LENGTH: u32 = LENGTH_OVERHEAD;

/// Default maximum `Length` value (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Frame message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Client to server request.
    Request = 0x01,
    /// Server reply to a request.
    Response = 0x02,
    /// Server push not solicited by an immediate request.
    Notification = 0x03,
}

impl MessageType {
    /// Parse a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(MessageType::Request),
            0x02 => Some(MessageType::Response),
            0x03 => Some(MessageType::Notification),
            _ => None,
        }
    }
}

/// Payload encoding tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    /// Compact MessagePack encoding.
    #[default]
    MessagePack = 0x01,
    /// Text JSON encoding (always offered as fallback).
    Json = 0x02,
}

impl Encoding {
    /// Parse a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Encoding::MessagePack),
            0x02 => Some(Encoding::Json),
            _ => None,
        }
    }

    /// Human readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::MessagePack => "msgpack",
            Encoding::Json => "json",
        }
    }
}

/// Decoded frame header.
///
/// Type and encoding are kept as raw bytes: an unknown value is a payload-level
/// concern and does not break framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Length of type + encoding + payload.
    pub length: u32,
    /// Raw message type byte.
    pub message_type: u8,
    /// Raw encoding tag byte.
    pub encoding: u8,
}

impl Header {
    /// Create a header for a payload of `payload_len` bytes.
    ///
    /// Returns `InvalidArgument` if the payload cannot be described by a 32-bit length.
    pub fn for_payload(
        message_type: MessageType,
        encoding: Encoding,
        payload_len: usize,
    ) -> Result<Self> {
        let length = u32::try_from(payload_len)
            .ok()
            .and_then(|len| len.checked_add(LENGTH_OVERHEAD))
            .ok_or_else(|| {
                Error::InvalidArgument(format!("payload of {} bytes is too large", payload_len))
            })?;

        Ok(Self {
            length,
            message_type: message_type as u8,
            encoding: encoding as u8,
        })
    }

    /// Payload size described by this header.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.length.saturating_sub(LENGTH_OVERHEAD) as usize
    }

    /// Typed message type, if known.
    #[inline]
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.message_type)
    }

    /// Typed encoding, if known.
    #[inline]
    pub fn encoding(&self) -> Option<Encoding> {
        Encoding::from_u8(self.encoding)
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use squirreldb_client::protocol::{Encoding, Header, MessageType};
    ///
    /// let header = Header::for_payload(MessageType::Request, Encoding::Json, 5).unwrap();
    /// assert_eq!(header.encode(), [0, 0, 0, 7, 0x01, 0x02]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4] = self.message_type;
        buf[5] = self.encoding;
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short. Length bounds are checked by
    /// [`Header::validate`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            message_type: buf[4],
            encoding: buf[5],
        })
    }

    /// Check the declared length against protocol bounds.
    ///
    /// A length below 2 or above `max_frame_size` is a decode failure.
    pub fn validate(&self, max_frame_size: u32) -> Result<()> {
        if self.length < MIN_FRAME_LENGTH {
            return Err(Error::DecodeFailed(format!(
                "frame length {} is below minimum {}",
                self.length, MIN_FRAME_LENGTH
            )));
        }

        if self.length > max_frame_size {
            return Err(Error::DecodeFailed(format!(
                "frame length {} exceeds maximum {}",
                self.length, max_frame_size
            )));
        }

        Ok(())
    }
}
