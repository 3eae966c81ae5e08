//! Subscription router for dispatching change pushes by subscription id.
//!
//! The router maps subscription ids to callbacks. A subscription id is the
//! correlation id of the `subscribe` request that opened it.
//!
//! # Backpressure
//!
//! [`SubscriptionRouter::dispatch`] runs the callback synchronously on the reader
//! task, before the next frame is read. A slow or blocking callback therefore
//! delays every later frame on the connection, replies to pending requests
//! included. Callbacks that need to do real work should hand the event off
//! (e.g. through a channel) and return.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use squirreldb_client::dispatch::SubscriptionRouter;
//! use squirreldb_client::protocol::ChangeEvent;
//! use serde_json::Value;
//!
//! let router = SubscriptionRouter::new();
//! router.subscribe("3", Arc::new(|event: ChangeEvent| println!("{:?}", event.kind())));
//!
//! assert!(router.dispatch("3", ChangeEvent::Delete { old: Value::Null }));
//! assert!(!router.dispatch("4", ChangeEvent::Delete { old: Value::Null }));
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::ChangeEvent;

/// Callback invoked for every change on a subscription.
///
/// Any user context travels in the closure's captures.
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Thread-safe registry mapping subscription ids to callbacks.
#[derive(Default)]
pub struct SubscriptionRouter {
    routes: Mutex<HashMap<String, ChangeCallback>>,
}

impl SubscriptionRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a callback for `id`.
    ///
    /// Returns `false` (and leaves the existing route alone) if `id` is taken.
    pub fn subscribe(&self, id: &str, callback: ChangeCallback) -> bool {
        let mut routes = self.routes.lock();
        if routes.contains_key(id) {
            tracing::warn!(subscription_id = id, "subscription id already routed");
            return false;
        }
        routes.insert(id.to_string(), callback);
        tracing::debug!(subscription_id = id, "subscription routed");
        true
    }

    /// Remove the route for `id`. No-op if absent.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let removed = self.routes.lock().remove(id).is_some();
        if removed {
            tracing::debug!(subscription_id = id, "subscription unrouted");
        }
        removed
    }

    /// Invoke the callback for `id`.
    ///
    /// The lock is released before the callback runs, so a callback may
    /// unsubscribe itself or others. A panicking callback is logged and
    /// swallowed. Returns whether a route existed.
    pub fn dispatch(&self, id: &str, event: ChangeEvent) -> bool {
        let callback = match self.routes.lock().get(id) {
            Some(callback) => Arc::clone(callback),
            None => {
                tracing::trace!(subscription_id = id, "change for unknown subscription");
                return false;
            }
        };

        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            tracing::warn!(subscription_id = id, "subscription callback panicked");
        }
        true
    }

    /// Drop every route, returning how many there were.
    pub fn clear(&self) -> usize {
        let drained: Vec<ChangeCallback> = self.routes.lock().drain().map(|(_, cb)| cb).collect();
        drained.len()
    }

    /// Whether `id` is routed.
    pub fn contains(&self, id: &str) -> bool {
        self.routes.lock().contains_key(id)
    }

    /// Ids of all routed subscriptions.
    pub fn ids(&self) -> Vec<String> {
        self.routes.lock().keys().cloned().collect()
    }

    /// Number of routed subscriptions.
    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    /// Whether nothing is routed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
