//! Operation payloads carried inside frames.
//!
//! Every payload is a record with a `type` discriminator and an `id` correlation
//! identifier. Requests reuse the id the client generated; replies and pushes echo it.
//! A payload whose `type` is `change` is a push for the subscription with that id;
//! everything else is a reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator value marking a push notification.
pub const CHANGE_KIND: &str = "change";

/// Discriminator value marking an error reply.
pub const ERROR_KIND: &str = "error";

/// Request payloads sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Liveness check.
    Ping { id: String },
    /// Run a query expression.
    Query { id: String, query: String },
    /// Insert a document.
    Insert {
        id: String,
        collection: String,
        data: Value,
    },
    /// Replace a document's data.
    Update {
        id: String,
        collection: String,
        document_id: String,
        data: Value,
    },
    /// Delete a document.
    Delete {
        id: String,
        collection: String,
        document_id: String,
    },
    /// List collection names.
    #[serde(rename = "listcollections")]
    ListCollections { id: String },
    /// Open a change feed.
    Subscribe { id: String, query: String },
    /// Close a change feed; `id` is the subscription id.
    Unsubscribe { id: String },
}

impl ClientMessage {
    /// Correlation identifier.
    pub fn id(&self) -> &str {
        match self {
            ClientMessage::Ping { id }
            | ClientMessage::Query { id, .. }
            | ClientMessage::Insert { id, .. }
            | ClientMessage::Update { id, .. }
            | ClientMessage::Delete { id, .. }
            | ClientMessage::ListCollections { id }
            | ClientMessage::Subscribe { id, .. }
            | ClientMessage::Unsubscribe { id } => id,
        }
    }
}

/// Reply and push payloads sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Answer to `ping`.
    Pong { id: String },
    /// Successful result.
    Result {
        id: String,
        #[serde(default)]
        data: Value,
    },
    /// Application-level failure.
    Error { id: String, error: String },
    /// Change feed opened.
    Subscribed { id: String },
    /// Change feed closed.
    Unsubscribed { id: String },
    /// Push for an open change feed.
    Change { id: String, change: ChangeEvent },
}

impl ServerMessage {
    /// Correlation identifier.
    pub fn id(&self) -> &str {
        match self {
            ServerMessage::Pong { id }
            | ServerMessage::Result { id, .. }
            | ServerMessage::Error { id, .. }
            | ServerMessage::Subscribed { id }
            | ServerMessage::Unsubscribed { id }
            | ServerMessage::Change { id, .. } => id,
        }
    }

    /// Wire discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Result { .. } => "result",
            ServerMessage::Error { .. } => ERROR_KIND,
            ServerMessage::Subscribed { .. } => "subscribed",
            ServerMessage::Unsubscribed { .. } => "unsubscribed",
            ServerMessage::Change { .. } => CHANGE_KIND,
        }
    }
}

/// The two routing fields of any payload; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    /// Correlation identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Discriminator.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl Envelope {
    /// Whether the payload is a push notification.
    pub fn is_change(&self) -> bool {
        self.kind.as_deref() == Some(CHANGE_KIND)
    }

    /// Whether the payload is an error reply.
    pub fn is_error(&self) -> bool {
        self.kind.as_deref() == Some(ERROR_KIND)
    }
}

/// A push notification payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangeNotification {
    /// Subscription identifier.
    pub id: String,
    /// The change itself.
    pub change: ChangeEvent,
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document UUID.
    pub id: String,
    /// Owning collection.
    pub collection: String,
    /// Document body.
    #[serde(default)]
    pub data: Value,
    /// ISO 8601 creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    #[serde(default)]
    pub updated_at: String,
}

/// Kind of a change event, with the numeric values used across the SDKs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChangeKind {
    Initial = 0,
    Insert = 1,
    Update = 2,
    Delete = 3,
}

/// A change delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeEvent {
    /// A document matching the feed at subscription time.
    Initial { document: Document },
    /// A newly inserted document.
    Insert { new: Document },
    /// An updated document with its previous data.
    Update {
        #[serde(default)]
        old: Value,
        new: Document,
    },
    /// A deleted document's last data.
    Delete {
        #[serde(default)]
        old: Value,
    },
}

impl ChangeEvent {
    /// Kind of this change.
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Initial { .. } => ChangeKind::Initial,
            ChangeEvent::Insert { .. } => ChangeKind::Insert,
            ChangeEvent::Update { .. } => ChangeKind::Update,
            ChangeEvent::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// The current document, when the change carries one.
    pub fn document(&self) -> Option<&Document> {
        match self {
            ChangeEvent::Initial { document } => Some(document),
            ChangeEvent::Insert { new } | ChangeEvent::Update { new, .. } => Some(new),
            ChangeEvent::Delete { .. } => None,
        }
    }
}
