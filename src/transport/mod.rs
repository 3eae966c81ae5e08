//! Transport module - socket setup.
//!
//! The protocol runs over one persistent TCP stream. Anything else that is
//! `AsyncRead + AsyncWrite` can stand in for it through
//! [`ClientBuilder::connect_stream`](crate::ClientBuilder::connect_stream).

mod tcp;

pub use tcp::{connect, DEFAULT_PORT};
