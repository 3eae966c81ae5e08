//! Protocol module - wire format, framing, handshake, and payload types.
//!
//! This module implements the binary protocol spoken over the TCP connection:
//! - 6-byte frame header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//! - One-shot session handshake
//! - Operation payloads carried inside frames

mod frame;
mod frame_buffer;
pub mod handshake;
mod message;
mod wire_format;

pub use frame::{encode_frame, Frame};
pub use frame_buffer::{FrameBuffer, FrameReader};
pub use handshake::{negotiate, HandshakeRequest, HandshakeResponse, HandshakeStatus, Session};
pub use message::{
    ChangeEvent, ChangeKind, ChangeNotification, ClientMessage, Document, Envelope,
    ServerMessage, CHANGE_KIND, ERROR_KIND,
};
pub use wire_format::{
    Encoding, Header, MessageType, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE, LENGTH_OVERHEAD,
    MIN_FRAME_LENGTH,
};
