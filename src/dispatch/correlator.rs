//! Request correlation: matching replies to waiting callers.
//!
//! Each in-flight request owns one slot in a shared registry, keyed by its
//! correlation id. A slot is a single-resolution `oneshot` channel: the reader
//! fulfills it at most once, and whoever resolves it first (reply, timeout,
//! connection teardown) removes it.
//!
//! ```text
//! caller ── register(id) ──► registry[id] = Slot ──► send frame
//!   │                                                    │
//!   └── wait(timeout) ◄── oneshot ◄── deliver(id) ◄── reader
//! ```
//!
//! The registry lock guards map mutation only; it is never held while a caller waits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use super::router::ChangeCallback;
use crate::codec;
use crate::error::{Error, Result};
use crate::protocol::Encoding;

/// A raw reply payload, decoded lazily by the caller.
#[derive(Debug, Clone)]
pub struct Reply {
    /// Encoding tag of the frame that carried the payload.
    pub encoding: Encoding,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Reply {
    /// Create a new reply.
    pub fn new(encoding: Encoding, payload: Bytes) -> Self {
        Self { encoding, payload }
    }

    /// Decode the payload with its own encoding.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        codec::decode(self.encoding, &self.payload)
    }
}

/// A registered slot, removed from the registry by [`RequestCorrelator::take`].
pub struct Slot {
    tx: oneshot::Sender<Reply>,
    subscription: Option<ChangeCallback>,
}

impl Slot {
    /// Callback to install if this slot belongs to a subscribe request.
    pub fn subscription(&self) -> Option<&ChangeCallback> {
        self.subscription.as_ref()
    }

    /// Hand the reply to the waiter.
    ///
    /// Returns `false` if the waiter has already gone away.
    pub fn fulfill(self, reply: Reply) -> bool {
        self.tx.send(reply).is_ok()
    }
}

#[derive(Default)]
struct Registry {
    slots: HashMap<String, Slot>,
    closed: bool,
}

/// Thread-safe registry of in-flight requests.
#[derive(Clone, Default)]
pub struct RequestCorrelator {
    inner: Arc<Mutex<Registry>>,
}

impl RequestCorrelator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plain request.
    ///
    /// Must happen before the request frame is written.
    pub fn register(&self, id: &str) -> Result<PendingRequest> {
        self.insert(id, None)
    }

    /// Register a subscribe request; the reader installs `callback` when the
    /// acknowledgment arrives, before it reads the next frame.
    pub fn register_subscription(
        &self,
        id: &str,
        callback: ChangeCallback,
    ) -> Result<PendingRequest> {
        self.insert(id, Some(callback))
    }

    fn insert(&self, id: &str, subscription: Option<ChangeCallback>) -> Result<PendingRequest> {
        let (tx, rx) = oneshot::channel();

        {
            let mut registry = self.inner.lock();
            if registry.closed {
                return Err(Error::ConnectionClosed);
            }
            if registry.slots.contains_key(id) {
                return Err(Error::InvalidArgument(format!(
                    "request id {} is already pending",
                    id
                )));
            }
            registry
                .slots
                .insert(id.to_string(), Slot { tx, subscription });
        }

        tracing::trace!(request_id = id, "registered pending request");

        Ok(PendingRequest {
            id: id.to_string(),
            rx,
            registry: Arc::clone(&self.inner),
        })
    }

    /// Remove and return the slot for `id`, if any.
    pub fn take(&self, id: &str) -> Option<Slot> {
        self.inner.lock().slots.remove(id)
    }

    /// Fulfill the slot for `id`.
    ///
    /// Returns `false` when no waiter is registered: it timed out, or the id was
    /// never ours. Both are expected and silently discarded.
    pub fn deliver(&self, id: &str, reply: Reply) -> bool {
        match self.take(id) {
            Some(slot) => slot.fulfill(reply),
            None => {
                tracing::debug!(request_id = id, "discarding reply with no waiter");
                false
            }
        }
    }

    /// Fail every pending request with `ConnectionClosed` and refuse new ones.
    ///
    /// Returns the number of requests failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<Slot> = {
            let mut registry = self.inner.lock();
            registry.closed = true;
            registry.slots.drain().map(|(_, slot)| slot).collect()
        };

        // Dropping a sender wakes its waiter with a closed-channel error.
        let count = drained.len();
        drop(drained);

        if count > 0 {
            tracing::debug!(count, "failed pending requests on close");
        }
        count
    }

    /// Whether `id` has a pending slot.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().slots.contains_key(id)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A caller's handle on one registered request.
///
/// Dropping it (after a timeout, or because the caller's future was cancelled)
/// removes the slot, so a late reply is discarded rather than leaked.
pub struct PendingRequest {
    id: String,
    rx: oneshot::Receiver<Reply>,
    registry: Arc<Mutex<Registry>>,
}

impl PendingRequest {
    /// Correlation id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the reply for at most `timeout`.
    ///
    /// # Errors
    ///
    /// - `Timeout` if nothing arrived in time
    /// - `ConnectionClosed` if the connection was torn down first
    pub async fn wait(mut self, timeout: Duration) -> Result<Reply> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => match self.abandon() {
                Some(reply) => Ok(reply),
                None => {
                    tracing::debug!(request_id = %self.id, ?timeout, "request timed out");
                    Err(Error::Timeout(timeout))
                }
            },
        }
    }

    /// Stop accepting a reply, returning one that slipped in first.
    ///
    /// After this, [`Slot::fulfill`] reports the waiter as gone, so the reader
    /// undoes a subscription route it installed for this id.
    pub(crate) fn abandon(&mut self) -> Option<Reply> {
        self.rx.close();
        self.rx.try_recv().ok()
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.registry.lock().slots.remove(&self.id);
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChangeEvent;

    fn reply(text: &'static str) -> Reply {
        Reply::new(Encoding::Json, Bytes::from_static(text.as_bytes()))
    }

    #[tokio::test]
    async fn test_deliver_wakes_waiter() {
        let correlator = RequestCorrelator::new();
        let pending = correlator.register("1").unwrap();
        assert!(correlator.contains("1"));

        assert!(correlator.deliver("1", reply(r#"{"type":"pong","id":"1"}"#)));

        let got = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(&got.payload[..], br#"{"type":"pong","id":"1"}"#);
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn test_reply_decodes_with_its_encoding() {
        let correlator = RequestCorrelator::new();
        let pending = correlator.register("2").unwrap();
        correlator.deliver("2", reply(r#"{"type":"result","id":"2","data":[1,2]}"#));

        let got = pending.wait(Duration::from_secs(1)).await.unwrap();
        let msg: crate::protocol::ServerMessage = got.decode().unwrap();
        assert_eq!(msg.id(), "2");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let correlator = RequestCorrelator::new();
        let _pending = correlator.register("7").unwrap();
        assert!(matches!(
            correlator.register("7"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_deliver_unknown_is_noop() {
        let correlator = RequestCorrelator::new();
        assert!(!correlator.deliver("404", reply("{}")));
    }

    #[tokio::test]
    async fn test_timeout_deregisters_and_late_reply_is_discarded() {
        let correlator = RequestCorrelator::new();
        let pending = correlator.register("3").unwrap();

        let err = pending.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(!correlator.contains("3"));

        assert!(!correlator.deliver("3", reply("{}")));
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_drop_deregisters() {
        let correlator = RequestCorrelator::new();
        let pending = correlator.register("4").unwrap();
        drop(pending);
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn test_fulfill_after_waiter_gone() {
        let correlator = RequestCorrelator::new();
        let pending = correlator.register("5").unwrap();

        let slot = correlator.take("5").unwrap();
        drop(pending);
        assert!(!slot.fulfill(reply("{}")));
    }

    #[tokio::test]
    async fn test_fail_all_wakes_every_waiter() {
        let correlator = RequestCorrelator::new();
        let waiters: Vec<_> = (0..5)
            .map(|i| {
                let pending = correlator.register(&i.to_string()).unwrap();
                tokio::spawn(pending.wait(Duration::from_secs(30)))
            })
            .collect();

        assert_eq!(correlator.fail_all(), 5);

        for waiter in waiters {
            let result = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(result, Err(Error::ConnectionClosed)));
        }
        assert!(matches!(
            correlator.register("9"),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_subscription_slot_carries_callback() {
        let correlator = RequestCorrelator::new();
        let callback: ChangeCallback = Arc::new(|_: ChangeEvent| {});
        let _pending = correlator.register_subscription("6", callback).unwrap();

        let slot = correlator.take("6").unwrap();
        assert!(slot.subscription().is_some());
        assert!(correlator.take("6").is_none());
    }

    #[tokio::test]
    async fn test_timed_out_waiter_refuses_reply_in_flight() {
        let correlator = RequestCorrelator::new();
        let callback: ChangeCallback = Arc::new(|_: ChangeEvent| {});
        let mut pending = correlator.register_subscription("7", callback).unwrap();

        // The reader has claimed the slot but not yet handed over the reply.
        let slot = correlator.take("7").unwrap();
        assert!(pending.abandon().is_none());

        // Receiver is still alive, yet the reply is refused.
        assert!(!slot.fulfill(reply(r#"{"type":"subscribed","id":"7"}"#)));
        drop(pending);
    }

    #[tokio::test]
    async fn test_abandon_keeps_reply_that_won_the_race() {
        let correlator = RequestCorrelator::new();
        let mut pending = correlator.register("8").unwrap();

        assert!(correlator.deliver("8", reply(r#"{"type":"pong","id":"8"}"#)));

        let got = pending.abandon().unwrap();
        assert_eq!(&got.payload[..], br#"{"type":"pong","id":"8"}"#);
    }
}
