//! Dispatch module - where incoming payloads go.
//!
//! - [`RequestCorrelator`] matches replies to the callers awaiting them
//! - [`SubscriptionRouter`] hands change pushes to subscription callbacks
//!
//! The two registries have independent locks and neither is ever taken while
//! the other is held.

mod correlator;
mod router;

pub use correlator::{PendingRequest, Reply, RequestCorrelator, Slot};
pub use router::{ChangeCallback, SubscriptionRouter};
