//! The reader task.
//!
//! Exactly one reader runs per connection. It pulls frames off the socket and
//! routes each one by payload contents:
//!
//! - `type == "change"` → [`SubscriptionRouter::dispatch`](crate::dispatch::SubscriptionRouter::dispatch)
//! - anything else → the pending request with the same `id`
//!
//! Malformed payloads are logged and skipped; the framing is still intact.
//! Framing or I/O faults, and EOF, end the loop and close the connection.

use std::sync::{Arc, Weak};

use tokio::io::AsyncRead;
use tokio::sync::Notify;

use crate::codec;
use crate::connection::Connection;
use crate::dispatch::Reply;
use crate::error::Error;
use crate::protocol::{ChangeNotification, Envelope, Frame, FrameReader};

/// Run until EOF, a transport fault, or a shutdown signal.
pub(crate) async fn run<R>(mut frames: FrameReader<R>, connection: Weak<Connection>, shutdown: Arc<Notify>)
where
    R: AsyncRead + Unpin,
{
    tracing::debug!("reader started");

    loop {
        let next = tokio::select! {
            _ = shutdown.notified() => {
                tracing::debug!("reader stopping on shutdown signal");
                if let Some(conn) = connection.upgrade() {
                    conn.close().await;
                }
                return;
            }
            next = frames.next_frame() => next,
        };

        let conn = match connection.upgrade() {
            Some(conn) => conn,
            None => return,
        };

        match next {
            Ok(Some(frame)) => route(&conn, frame),
            Ok(None) => {
                conn.close_with(&Error::ConnectionClosed).await;
                return;
            }
            Err(e) => {
                conn.close_with(&e).await;
                return;
            }
        }
    }
}

/// Hand one frame to the correlator or the router.
fn route(conn: &Connection, frame: Frame) {
    let encoding = match frame.encoding() {
        Some(encoding) => encoding,
        None => {
            tracing::warn!(tag = frame.header.encoding, "dropping frame with unknown encoding");
            return;
        }
    };

    let envelope: Envelope = match codec::decode(encoding, frame.payload()) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, len = frame.payload_len(), "dropping malformed payload");
            return;
        }
    };

    let id = match envelope.id.as_deref() {
        Some(id) => id,
        None => {
            tracing::warn!(kind = ?envelope.kind, "dropping payload without id");
            return;
        }
    };

    if envelope.is_change() {
        match codec::decode::<ChangeNotification>(encoding, frame.payload()) {
            Ok(note) => {
                tracing::trace!(subscription_id = id, kind = ?note.change.kind(), "change");
                conn.router().dispatch(&note.id, note.change);
            }
            Err(e) => {
                tracing::warn!(subscription_id = id, error = %e, "dropping malformed change");
            }
        }
        return;
    }

    let slot = match conn.correlator().take(id) {
        Some(slot) => slot,
        None => {
            tracing::debug!(request_id = id, kind = ?envelope.kind, "discarding reply with no waiter");
            return;
        }
    };

    // Route the subscription before the next frame is read, so changes that
    // follow the acknowledgment immediately are not lost.
    let routed = match slot.subscription() {
        Some(callback) if !envelope.is_error() => conn.router().subscribe(id, Arc::clone(callback)),
        _ => false,
    };

    tracing::trace!(request_id = id, kind = ?envelope.kind, "reply");
    if !slot.fulfill(Reply::new(encoding, frame.payload_bytes())) && routed {
        conn.router().unsubscribe(id);
    }
}
