//! The connection's write path.
//!
//! All frames leave through one [`FrameWriter`]. Its lock serializes writers so
//! frames from concurrent callers never interleave, and it also owns the
//! request-id counter, which only advances while the lock is held:
//!
//! ```text
//! caller ─► lock ─► next_request_id ─► register ─► send ─► unlock ─► wait
//! ```
//!
//! Registering with the correlator inside the critical section, before the
//! frame is written, closes the race where a reply arrives before its waiter.
//!
//! A frame is written from the caller's future, which may be dropped at any
//! await. If that leaves a frame half on the wire, the guard drops the sink on
//! release and raises the `broken` signal, so no later frame is appended to
//! the torn one and the connection is torn down.

use std::io::{self, IoSlice};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::codec;
use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, Encoding, Header, MessageType, HEADER_SIZE};

/// Type-erased write half of the transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct WriterState {
    sink: Option<BoxedWriter>,
    next_request_id: u64,
    /// Set while the sink holds an incomplete frame.
    partial: bool,
}

/// Mutually exclusive frame writer.
pub struct FrameWriter {
    state: Mutex<WriterState>,
    encoding: Encoding,
    max_frame_size: u32,
    broken: Arc<Notify>,
}

impl FrameWriter {
    /// Wrap `sink`. Payloads are encoded with `encoding`; frames whose `Length`
    /// would exceed `max_frame_size` are refused. `broken` is notified when a
    /// frame is left incomplete.
    pub fn new(
        sink: BoxedWriter,
        encoding: Encoding,
        max_frame_size: u32,
        broken: Arc<Notify>,
    ) -> Self {
        Self {
            state: Mutex::new(WriterState {
                sink: Some(sink),
                next_request_id: 1,
                partial: false,
            }),
            encoding,
            max_frame_size,
            broken,
        }
    }

    /// Enter the write critical section.
    pub async fn lock(&self) -> WriteGuard<'_> {
        WriteGuard {
            state: self.state.lock().await,
            encoding: self.encoding,
            max_frame_size: self.max_frame_size,
            broken: &self.broken,
        }
    }

    /// Shut the sink down; later sends fail with `ConnectionClosed`.
    ///
    /// Best-effort: shutdown errors are logged, not returned.
    pub async fn shutdown(&self) {
        let sink = self.state.lock().await.sink.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.shutdown().await {
                tracing::debug!(error = %e, "writer shutdown failed");
            }
        }
    }
}

/// Exclusive access to the write path.
pub struct WriteGuard<'a> {
    state: MutexGuard<'a, WriterState>,
    encoding: Encoding,
    max_frame_size: u32,
    broken: &'a Notify,
}

impl WriteGuard<'_> {
    /// Take the next request id. Ids start at 1 and are never reused.
    pub fn next_request_id(&mut self) -> String {
        let id = self.state.next_request_id;
        self.state.next_request_id += 1;
        id.to_string()
    }

    /// Encode `message` and write it as one request frame.
    ///
    /// # Errors
    ///
    /// - `EncodeFailed` / `InvalidArgument` before anything is written
    /// - `ConnectionClosed` if the writer was shut down
    /// - `SendFailed` if the socket write failed; the stream is then unusable
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let payload = codec::encode(self.encoding, message)?;
        self.send_raw(MessageType::Request, &payload).await?;
        tracing::trace!(request_id = message.id(), len = payload.len(), "sent request");
        Ok(())
    }

    /// Write one frame carrying `payload` verbatim.
    pub async fn send_raw(&mut self, message_type: MessageType, payload: &[u8]) -> Result<()> {
        let header = Header::for_payload(message_type, self.encoding, payload.len())?;
        if header.length > self.max_frame_size {
            return Err(Error::InvalidArgument(format!(
                "frame length {} exceeds maximum {}",
                header.length, self.max_frame_size
            )));
        }

        let state = &mut *self.state;
        let sink = state.sink.as_mut().ok_or(Error::ConnectionClosed)?;
        write_frame(sink, &header.encode(), payload, &mut state.partial)
            .await
            .map_err(Error::SendFailed)
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if !self.state.partial {
            return;
        }
        self.state.partial = false;
        if self.state.sink.take().is_some() {
            tracing::warn!("frame left incomplete; dropping the sink");
        }
        self.broken.notify_one();
    }
}

/// Write header and payload with scatter/gather I/O, resuming after partial writes.
///
/// `partial` is true exactly while some but not all of the frame has been
/// accepted by `writer`; it stays set if the write fails midway.
async fn write_frame<W>(
    writer: &mut W,
    header: &[u8; HEADER_SIZE],
    payload: &[u8],
    partial: &mut bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size = HEADER_SIZE + payload.len();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(header, payload, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            ));
        }
        total_written += written;
        *partial = total_written < total_size;
    }

    writer.flush().await
}

/// IoSlices for whatever is left after `skip_bytes` have been written.
fn remaining_slices<'a>(
    header: &'a [u8; HEADER_SIZE],
    payload: &'a [u8],
    skip_bytes: usize,
) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(2);

    if skip_bytes < HEADER_SIZE {
        slices.push(IoSlice::new(&header[skip_bytes..]));
    }

    let payload_skip = skip_bytes.saturating_sub(HEADER_SIZE);
    if payload_skip < payload.len() {
        slices.push(IoSlice::new(&payload[payload_skip..]));
    }

    slices
}
