//! Client configuration.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{Encoding, DEFAULT_MAX_FRAME_SIZE, MIN_FRAME_LENGTH};

/// Default bound on TCP connect and on the handshake (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default bound on each request's wait for its reply (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Options recognized by the client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Bounds the TCP connect and the handshake exchange.
    pub connect_timeout: Duration,
    /// Bounds each request's wait for its reply, and each frame write.
    pub request_timeout: Duration,
    /// Encoding we ask for. Advisory: the server decides.
    pub encoding: Encoding,
    /// Opaque credential, forwarded verbatim in the handshake.
    pub credential: Option<Vec<u8>>,
    /// Largest accepted frame `Length`, in either direction.
    pub max_frame_size: u32,
}

impl ClientConfig {
    /// Check the options before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "connect timeout must be non-zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "request timeout must be non-zero".to_string(),
            ));
        }
        if self.max_frame_size < MIN_FRAME_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "max frame size must be at least {}",
                MIN_FRAME_LENGTH
            )));
        }
        if let Some(credential) = &self.credential {
            if credential.len() > u16::MAX as usize {
                return Err(Error::InvalidArgument(format!(
                    "credential must be at most {} bytes",
                    u16::MAX
                )));
            }
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            encoding: Encoding::MessagePack,
            credential: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

// Credentials stay out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("encoding", &self.encoding)
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "<redacted>"),
            )
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}
