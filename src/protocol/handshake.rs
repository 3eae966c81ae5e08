//! Session handshake.
//!
//! The handshake is a fixed one-shot exchange that runs before any frame traffic:
//!
//! ```text
//! request:  ┌────────┬─────────┬───────┬──────────────┬────────────┐
//!           │ "SQRL" │ version │ flags │ cred. length │ credential │
//!           │ 4 bytes│ 1 byte  │ 1 byte│ uint16 BE    │ N bytes    │
//!           └────────┴─────────┴───────┴──────────────┴────────────┘
//! response: ┌────────┬─────────┬───────┬───────────────────────────┐
//!           │ status │ version │ flags │ session id (raw UUID)     │
//!           │ 1 byte │ 1 byte  │ 1 byte│ 16 bytes                  │
//!           └────────┴─────────┴───────┴───────────────────────────┘
//! ```
//!
//! The client always offers JSON and additionally offers MessagePack when preferred;
//! the server picks the encoding and reports it in the response flags.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use super::wire_format::Encoding;
use crate::error::{Error, Result};

/// Magic tag opening every handshake.
pub const MAGIC: [u8; 4] = *b"SQRL";

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Fixed size of the handshake response.
pub const HANDSHAKE_RESPONSE_SIZE: usize = 19;

/// Handshake flag bits.
pub mod flags {
    /// Request: client offers MessagePack.
    pub const OFFER_MSGPACK: u8 = 0b0000_0001;
    /// Request: client accepts the JSON fallback (always set).
    pub const OFFER_JSON: u8 = 0b0000_0010;
    /// Response: server selected MessagePack.
    pub const SELECTED_MSGPACK: u8 = 0b0000_0001;
}

/// Status byte of the handshake response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// Session established.
    Success,
    /// Server does not speak the requested version.
    VersionMismatch,
    /// Credential rejected.
    AuthFailed,
    /// Any other status byte.
    Unknown(u8),
}

impl HandshakeStatus {
    /// Parse a wire byte.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => HandshakeStatus::Success,
            0x01 => HandshakeStatus::VersionMismatch,
            0x02 => HandshakeStatus::AuthFailed,
            other => HandshakeStatus::Unknown(other),
        }
    }
}

/// Outgoing handshake.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    /// Protocol version to request.
    pub version: u8,
    /// Encoding we would like the server to pick.
    pub preferred: Encoding,
    /// Opaque credential bytes, forwarded verbatim.
    pub credential: Option<Vec<u8>>,
}

impl HandshakeRequest {
    /// Build a request for the current protocol version.
    pub fn new(preferred: Encoding, credential: Option<Vec<u8>>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            preferred,
            credential,
        }
    }

    /// Flags byte advertising our encodings.
    pub fn flags(&self) -> u8 {
        match self.preferred {
            Encoding::MessagePack => flags::OFFER_MSGPACK | flags::OFFER_JSON,
            Encoding::Json => flags::OFFER_JSON,
        }
    }

    /// Encode to wire bytes.
    ///
    /// Fails with `InvalidArgument` if the credential does not fit a 16-bit length.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let credential = self.credential.as_deref().unwrap_or(&[]);
        let credential_len = u16::try_from(credential.len()).map_err(|_| {
            Error::InvalidArgument(format!(
                "credential of {} bytes exceeds {} bytes",
                credential.len(),
                u16::MAX
            ))
        })?;

        let mut buf = Vec::with_capacity(8 + credential.len());
        buf.extend_from_slice(&MAGIC);
        buf.push(self.version);
        buf.push(self.flags());
        buf.extend_from_slice(&credential_len.to_be_bytes());
        buf.extend_from_slice(credential);
        Ok(buf)
    }
}

/// Decoded handshake response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Status reported by the server.
    pub status: HandshakeStatus,
    /// Version the server settled on.
    pub version: u8,
    /// Response flags.
    pub flags: u8,
    /// Raw session identifier.
    pub session_id: [u8; 16],
}

impl HandshakeResponse {
    /// Decode the fixed-size response.
    pub fn decode(buf: &[u8; HANDSHAKE_RESPONSE_SIZE]) -> Self {
        let mut session_id = [0u8; 16];
        session_id.copy_from_slice(&buf[3..HANDSHAKE_RESPONSE_SIZE]);
        Self {
            status: HandshakeStatus::from_u8(buf[0]),
            version: buf[1],
            flags: buf[2],
            session_id,
        }
    }

    /// Turn the response into a session, mapping non-success statuses to errors.
    pub fn into_session(self) -> Result<Session> {
        match self.status {
            HandshakeStatus::Success => {}
            HandshakeStatus::VersionMismatch => {
                return Err(Error::VersionMismatch {
                    server_version: self.version,
                })
            }
            HandshakeStatus::AuthFailed => return Err(Error::AuthFailed),
            HandshakeStatus::Unknown(status) => {
                return Err(Error::HandshakeFailed(format!(
                    "unknown handshake status 0x{:02x}",
                    status
                )))
            }
        }

        let encoding = if self.flags & flags::SELECTED_MSGPACK != 0 {
            Encoding::MessagePack
        } else {
            Encoding::Json
        };

        Ok(Session {
            id: Uuid::from_bytes(self.session_id),
            version: self.version,
            encoding,
        })
    }
}

/// An established protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Server-assigned session identifier.
    pub id: Uuid,
    /// Negotiated protocol version.
    pub version: u8,
    /// Negotiated payload encoding.
    pub encoding: Encoding,
}

impl Session {
    /// Canonical hyphenated form of the session identifier.
    pub fn id_string(&self) -> String {
        self.id.hyphenated().to_string()
    }
}

/// Run the handshake over `stream`, bounded by `timeout`.
///
/// Not reentrant: it must complete before any frame is sent or read.
pub async fn negotiate<S>(
    stream: &mut S,
    request: &HandshakeRequest,
    timeout: Duration,
) -> Result<Session>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let bytes = request.encode()?;

    let exchange = async {
        stream.write_all(&bytes).await.map_err(Error::SendFailed)?;
        stream.flush().await.map_err(Error::SendFailed)?;

        let mut response = [0u8; HANDSHAKE_RESPONSE_SIZE];
        stream
            .read_exact(&mut response)
            .await
            .map_err(Error::ReceiveFailed)?;
        Ok::<_, Error>(HandshakeResponse::decode(&response))
    };

    let response = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| Error::Timeout(timeout))??;

    tracing::debug!(
        status = ?response.status,
        version = response.version,
        flags = response.flags,
        "handshake response"
    );

    response.into_session()
}
