//! Error types for squirreldb-client.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for all client operations.
///
/// Transport and framing faults (`SendFailed`, `ReceiveFailed`, `DecodeFailed` on a
/// frame) close the connection. Argument faults never touch the network, and a
/// `Timeout` only abandons the local wait; the request stays outstanding server-side.
#[derive(Debug, Error)]
pub enum Error {
    /// The TCP connection could not be established.
    #[error("connection failed: {0}")]
    ConnectFailed(#[source] io::Error),

    /// The handshake exchange produced an unusable answer.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The server does not speak our protocol version.
    #[error("protocol version mismatch (server offered version {server_version})")]
    VersionMismatch {
        /// Version byte reported by the server.
        server_version: u8,
    },

    /// The server rejected the credential.
    #[error("authentication failed")]
    AuthFailed,

    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    /// Reading from the socket failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// No answer arrived within the configured bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The connection is closing or closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A caller-supplied argument was rejected locally.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A payload could not be serialized.
    #[error("encoding failed: {0}")]
    EncodeFailed(String),

    /// A frame or payload was malformed or oversized.
    #[error("decoding failed: {0}")]
    DecodeFailed(String),

    /// The server answered with a well-formed error payload.
    #[error("server error: {0}")]
    ServerError(String),

    /// The addressed document does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Stable numeric code, shared with the other SquirrelDB client SDKs.
    pub fn code(&self) -> u8 {
        match self {
            Error::ConnectFailed(_) => 1,
            Error::HandshakeFailed(_) => 2,
            Error::VersionMismatch { .. } => 3,
            Error::AuthFailed => 4,
            Error::SendFailed(_) => 5,
            Error::ReceiveFailed(_) => 6,
            Error::Timeout(_) => 7,
            Error::ConnectionClosed => 8,
            Error::InvalidArgument(_) => 9,
            Error::EncodeFailed(_) => 11,
            Error::DecodeFailed(_) => 12,
            Error::ServerError(_) => 13,
            Error::NotFound(_) => 14,
        }
    }

    /// Whether this error means the connection can no longer be used.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::SendFailed(_) | Error::ReceiveFailed(_) | Error::ConnectionClosed
        )
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
