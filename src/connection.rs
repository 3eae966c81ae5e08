//! Shared connection core.
//!
//! A [`Connection`] bundles everything the facade and the reader task share:
//! the negotiated session, the write path, both dispatch registries and the
//! lifecycle state. The facade owns it through an `Arc`; the reader holds only
//! a `Weak`, so dropping the client is enough to end the connection.

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::config::ClientConfig;
use crate::dispatch::{ChangeCallback, Reply, RequestCorrelator, SubscriptionRouter};
use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, Session};
use crate::writer::{BoxedWriter, FrameWriter};

/// Connection lifecycle.
///
/// `Disconnected → Handshaking → Connected → Closing → Closed`. A failed
/// handshake falls back to `Disconnected`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No socket.
    Disconnected = 0,
    /// Handshake in flight.
    Handshaking = 1,
    /// Ready for requests.
    Connected = 2,
    /// Teardown in progress.
    Closing = 3,
    /// Torn down.
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Handshaking,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `Closing` unless already closing or closed.
    fn begin_close(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < ConnectionState::Closing as u8)
                    .then_some(ConnectionState::Closing as u8)
            })
            .is_ok()
    }
}

/// State shared between the facade and the reader task.
pub struct Connection {
    session: Session,
    config: ClientConfig,
    state: StateCell,
    writer: FrameWriter,
    correlator: RequestCorrelator,
    router: SubscriptionRouter,
    shutdown: Arc<Notify>,
}

impl Connection {
    /// Build a connected core around the write half of an established session.
    pub(crate) fn new(session: Session, config: ClientConfig, sink: BoxedWriter) -> Self {
        let shutdown = Arc::new(Notify::new());
        let writer = FrameWriter::new(
            sink,
            session.encoding,
            config.max_frame_size,
            Arc::clone(&shutdown),
        );
        Self {
            session,
            config,
            state: StateCell::new(ConnectionState::Connected),
            writer,
            correlator: RequestCorrelator::new(),
            router: SubscriptionRouter::new(),
            shutdown,
        }
    }

    /// Negotiated session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Whether requests can be issued.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Pending-request registry.
    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    /// Subscription registry.
    pub fn router(&self) -> &SubscriptionRouter {
        &self.router
    }

    pub(crate) fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Ask the reader task to stop; it tears the connection down on its way out.
    pub(crate) fn signal_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Issue one request and wait for its reply.
    ///
    /// `build` receives the freshly generated request id. With a `subscription`
    /// callback, the reader routes the id as soon as a non-error reply arrives.
    pub(crate) async fn request<F>(
        &self,
        build: F,
        subscription: Option<ChangeCallback>,
    ) -> Result<(String, Reply)>
    where
        F: FnOnce(String) -> ClientMessage,
    {
        if !self.is_connected() {
            return Err(Error::ConnectionClosed);
        }

        let timeout = self.config.request_timeout;
        let mut guard = self.writer.lock().await;
        let id = guard.next_request_id();
        let message = build(id.clone());

        let pending = match subscription {
            Some(callback) => self.correlator.register_subscription(&id, callback)?,
            None => self.correlator.register(&id)?,
        };

        let sent = match tokio::time::timeout(timeout, guard.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(Error::SendFailed(io::Error::new(
                io::ErrorKind::TimedOut,
                "frame write timed out",
            ))),
        };
        drop(guard);

        if let Err(e) = sent {
            drop(pending);
            if e.is_transport() {
                self.close_with(&e).await;
            }
            return Err(e);
        }

        let reply = pending.wait(timeout).await?;
        Ok((id, reply))
    }

    /// Send a frame that expects no reply. Does not advance the request counter.
    pub(crate) async fn send_unacknowledged(&self, message: &ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::ConnectionClosed);
        }

        let timeout = self.config.request_timeout;
        let mut guard = self.writer.lock().await;
        let sent = match tokio::time::timeout(timeout, guard.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(Error::SendFailed(io::Error::new(
                io::ErrorKind::TimedOut,
                "frame write timed out",
            ))),
        };
        drop(guard);

        if let Err(e) = &sent {
            if e.is_transport() {
                self.close_with(e).await;
            }
        }
        sent
    }

    /// Operator-initiated close. Returns `false` if already closing or closed.
    pub async fn close(&self) -> bool {
        if !self.state.begin_close() {
            return false;
        }
        tracing::debug!(session_id = %self.session.id, "closing connection");
        self.teardown().await;
        true
    }

    /// Close because of a transport fault.
    pub(crate) async fn close_with(&self, error: &Error) {
        if self.state.begin_close() {
            tracing::error!(session_id = %self.session.id, error = %error, "connection failed");
            self.teardown().await;
        }
    }

    /// Fail pending work, drop routes, stop the reader and shut the socket.
    ///
    /// Pending requests are failed first so callers are released without
    /// waiting on the write lock.
    async fn teardown(&self) {
        let failed = self.correlator.fail_all();
        let dropped = self.router.clear();
        self.shutdown.notify_one();
        self.writer.shutdown().await;
        self.state.set(ConnectionState::Closed);

        tracing::debug!(
            failed_requests = failed,
            dropped_subscriptions = dropped,
            state = ?ConnectionState::Closed,
            "connection closed"
        );
    }
}
