//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 6 bytes
//! - `WaitingForPayload`: Header parsed and validated, need N more payload bytes
//!
//! The declared length is validated as soon as the header is complete, so an
//! undersized or oversized frame is rejected before any payload is buffered.
//!
//! # Example
//!
//! ```
//! use squirreldb_client::protocol::{encode_frame, Encoding, FrameBuffer, MessageType};
//!
//! let bytes = encode_frame(MessageType::Response, Encoding::Json, b"{\"id\":\"1\"}").unwrap();
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in chunks from the socket
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{Header, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::{Error, Result};

/// Size of a single socket read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 6 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// Owned by exactly one reader; it is never shared.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed frame length.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default 16 MiB frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom frame limit.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            state: State::WaitingForHeader,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns `DecodeFailed` if a header declares a length below 2 or above the
    /// configured maximum.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_next()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Try to extract a single frame from already buffered bytes.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the declared length is out of bounds
    pub fn try_next(&mut self) -> Result<Option<Frame>> {
        if let State::WaitingForHeader = self.state {
            let header = match Header::decode(&self.buffer) {
                Some(header) => header,
                None => return Ok(None),
            };

            header.validate(self.max_frame_size)?;

            let _ = self.buffer.split_to(HEADER_SIZE);
            self.state = State::WaitingForPayload { header };
        }

        let header = match self.state {
            State::WaitingForPayload { header } => header,
            State::WaitingForHeader => return Ok(None),
        };

        let needed = header.payload_len();
        if self.buffer.len() < needed {
            self.buffer.reserve(needed - self.buffer.len());
            return Ok(None);
        }

        let payload = self.buffer.split_to(needed).freeze();
        self.state = State::WaitingForHeader;

        Ok(Some(Frame::new(header, payload)))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a frame has been started but not finished.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForPayload { .. })
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls whole frames off a byte stream.
pub struct FrameReader<R> {
    inner: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a read half with the given frame limit.
    pub fn new(inner: R, max_frame_size: u32) -> Self {
        Self {
            inner,
            buffer: FrameBuffer::with_max_frame_size(max_frame_size),
            chunk: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Wait until one complete frame is available.
    ///
    /// Returns `Ok(None)` when the peer closes the stream on a frame boundary.
    /// A close in the middle of a frame is a `ReceiveFailed`.
    ///
    /// Cancel safe: bytes are only appended to the buffer once a read completes.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.buffer.try_next()? {
                return Ok(Some(frame));
            }

            let n = self
                .inner
                .read(&mut self.chunk)
                .await
                .map_err(Error::ReceiveFailed)?;

            if n == 0 {
                if self.buffer.has_partial_frame() {
                    return Err(Error::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed in the middle of a frame",
                    )));
                }
                return Ok(None);
            }

            self.buffer.buffer.extend_from_slice(&self.chunk[..n]);
        }
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, Encoding, MessageType};
    use tokio::io::AsyncWriteExt;

    fn make_frame_bytes(payload: &[u8]) -> Vec<u8> {
        encode_frame(MessageType::Response, Encoding::Json, payload).unwrap()
    }

    fn raw_header(length: u32) -> Vec<u8> {
        let mut bytes = length.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0x02, 0x02]);
        bytes
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"hello");
        assert_eq!(frames[0].message_type(), Some(MessageType::Response));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = make_frame_bytes(b"first");
        combined.extend(make_frame_bytes(b"second"));
        combined.extend(make_frame_bytes(b"third"));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload(), b"first");
        assert_eq!(frames[1].payload(), b"second");
        assert_eq!(frames[2].payload(), b"third");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(b"test");

        assert!(buffer.push(&frame_bytes[..3]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let frames = buffer.push(&frame_bytes[3..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"test");
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = FrameBuffer::new();
        let payload = b"this is a longer payload that will be fragmented";
        let frame_bytes = make_frame_bytes(payload);

        let partial_len = HEADER_SIZE + 10;
        assert!(buffer.push(&frame_bytes[..partial_len]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        let frames = buffer.push(&frame_bytes[partial_len..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), payload);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(b"hi");

        let mut all_frames = Vec::new();
        for byte in &frame_bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].payload(), b"hi");
    }

    #[test]
    fn test_empty_payload() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(b"")).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload().is_empty());
        assert_eq!(frames[0].header.length, 2);
    }

    #[test]
    fn test_undersized_length_rejected() {
        for length in [0u32, 1] {
            let mut buffer = FrameBuffer::new();
            let err = buffer.push(&raw_header(length)).unwrap_err();
            assert!(matches!(err, Error::DecodeFailed(_)));
        }
    }

    #[test]
    fn test_oversized_length_rejected_before_payload() {
        let mut buffer = FrameBuffer::with_max_frame_size(100);

        // Only the header arrives; the frame is refused without waiting for the body.
        let err = buffer.push(&raw_header(101)).unwrap_err();
        assert!(matches!(err, Error::DecodeFailed(_)));
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_max_length_accepted() {
        let mut buffer = FrameBuffer::with_max_frame_size(10);
        let frames = buffer.push(&make_frame_bytes(b"12345678")).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();

        let frame1 = make_frame_bytes(b"first");
        let frame2 = make_frame_bytes(b"second");

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..4]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(buffer.has_partial_frame());

        let frames = buffer.push(&frame2[4..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"second");
        assert!(!buffer.has_partial_frame());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(b"test");

        buffer.push(&frame_bytes[..HEADER_SIZE + 1]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        buffer.clear();

        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_reader_reassembles_split_writes() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(rx, DEFAULT_MAX_FRAME_SIZE);

        let payload = vec![0xAB; 300];
        let bytes = make_frame_bytes(&payload);
        tokio::spawn(async move {
            for piece in bytes.chunks(7) {
                tx.write_all(piece).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.payload(), &payload[..]);
    }

    #[tokio::test]
    async fn test_reader_clean_eof() {
        let (tx, rx) = tokio::io::duplex(64);
        drop(tx);

        let mut reader = FrameReader::new(rx, DEFAULT_MAX_FRAME_SIZE);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_eof_mid_frame() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let bytes = make_frame_bytes(b"truncated payload");
        tx.write_all(&bytes[..HEADER_SIZE + 3]).await.unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx, DEFAULT_MAX_FRAME_SIZE);
        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(err, Error::ReceiveFailed(_)));
    }

    #[tokio::test]
    async fn test_reader_rejects_oversized() {
        let (mut tx, rx) = tokio::io::duplex(64);
        tx.write_all(&raw_header(4096)).await.unwrap();

        let mut reader = FrameReader::new(rx, 1024);
        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(err, Error::DecodeFailed(_)));
    }
}
