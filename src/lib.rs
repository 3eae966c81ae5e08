//! # squirreldb-client
//!
//! Async Rust client for the SquirrelDB binary protocol.
//!
//! One TCP connection carries many concurrent requests. Each request gets a
//! fresh correlation id, and a single background reader matches replies back to
//! their callers and hands change-feed pushes to subscription callbacks.
//!
//! ## Architecture
//!
//! ```text
//! caller ─► Client ─► FrameWriter ─────────────────────► socket
//!              │          (lock, id, register, send)        │
//!              ▼                                            ▼
//!       RequestCorrelator ◄── reply ──┐               reader task
//!       SubscriptionRouter ◄── change ┴──── route ◄── FrameReader
//! ```
//!
//! - **Handshake**: magic, version, encoding offer and credential; the server
//!   answers with a status, its encoding choice and a session UUID
//! - **Frames**: `u32` length, message type, encoding tag, payload
//! - **Payloads**: MessagePack or JSON records with `type` and `id` fields
//!
//! ## Example
//!
//! ```no_run
//! use squirreldb_client::Client;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), squirreldb_client::Error> {
//!     let client = Client::connect(("localhost", squirreldb_client::DEFAULT_PORT)).await?;
//!     let collections = client.list_collections().await?;
//!     let rows: Value = client.query(r#"db.table("users").run()"#).await?;
//!     println!("{:?} {}", collections, rows);
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;
mod connection;
mod reader;
mod writer;

pub use client::{Client, ClientBuilder, Subscription};
pub use config::{ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use connection::ConnectionState;
pub use dispatch::ChangeCallback;
pub use error::{Error, Result};
pub use protocol::{ChangeEvent, ChangeKind, Document, Encoding};
pub use transport::DEFAULT_PORT;
