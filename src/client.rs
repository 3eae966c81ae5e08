//! Client builder and facade.
//!
//! The [`ClientBuilder`] collects options and opens the connection. The
//! [`Client`] manages the lifecycle:
//! 1. Connect TCP (bounded by the connect timeout)
//! 2. Run the handshake (same bound)
//! 3. Spawn the reader task
//! 4. Multiplex requests until [`Client::disconnect`] or drop
//!
//! # Example
//!
//! ```no_run
//! use squirreldb_client::{ChangeEvent, Client};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), squirreldb_client::Error> {
//!     let client = Client::builder()
//!         .auth_token("secret")
//!         .connect("localhost:8082")
//!         .await?;
//!
//!     client.ping().await?;
//!     let doc = client.insert("users", &json!({ "name": "Alice" })).await?;
//!     let users: Vec<Value> = client.query(r#"db.table("users").run()"#).await?;
//!
//!     let sub = client
//!         .subscribe(r#"db.table("users").changes()"#, |event: ChangeEvent| {
//!             println!("{:?}", event.kind());
//!         })
//!         .await?;
//!
//!     sub.unsubscribe().await;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::ToSocketAddrs;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState};
use crate::dispatch::{ChangeCallback, Reply};
use crate::error::{Error, Result};
use crate::protocol::{
    negotiate, ChangeEvent, ClientMessage, Document, Encoding, FrameReader, HandshakeRequest,
    ServerMessage, Session,
};
use crate::{reader, transport};

/// Builder for configuring and connecting a client.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all options at once.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound on TCP connect and on the handshake.
    ///
    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Bound on each request's wait for its reply.
    ///
    /// Default: 30 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Preferred payload encoding. The server makes the final choice.
    ///
    /// Default: MessagePack
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Opaque credential bytes, sent verbatim in the handshake.
    pub fn credential(mut self, credential: impl Into<Vec<u8>>) -> Self {
        self.config.credential = Some(credential.into());
        self
    }

    /// Authenticate with a token.
    pub fn auth_token(self, token: &str) -> Self {
        self.credential(token.as_bytes())
    }

    /// Largest accepted frame `Length`.
    ///
    /// Default: 16 MiB
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Connect over TCP.
    pub async fn connect<A: ToSocketAddrs>(self, addr: A) -> Result<Client> {
        self.config.validate()?;
        let stream = transport::connect(addr, self.config.connect_timeout).await?;
        self.connect_stream(stream).await
    }

    /// Run the protocol over an already-open stream.
    pub async fn connect_stream<S>(self, mut stream: S) -> Result<Client>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.config.validate()?;

        tracing::debug!(
            state = ?ConnectionState::Handshaking,
            encoding = self.config.encoding.as_str(),
            "starting handshake"
        );
        let request = HandshakeRequest::new(self.config.encoding, self.config.credential.clone());
        let session = match negotiate(&mut stream, &request, self.config.connect_timeout).await {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(state = ?ConnectionState::Disconnected, error = %e, "handshake failed");
                return Err(e);
            }
        };

        tracing::debug!(
            state = ?ConnectionState::Connected,
            session_id = %session.id,
            encoding = session.encoding.as_str(),
            "connected"
        );
        Ok(Client::start(stream, session, self.config))
    }
}

/// A connected client.
///
/// All operations take `&self` and may run concurrently; replies are matched
/// to callers by request id. Dropping the client stops the reader task and
/// closes the connection.
pub struct Client {
    connection: Arc<Connection>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect over TCP with default options.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        ClientBuilder::new().connect(addr).await
    }

    fn start<S>(stream: S, session: Session, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let frames = FrameReader::new(read_half, config.max_frame_size);
        let connection = Arc::new(Connection::new(session, config, Box::new(write_half)));

        let reader = tokio::spawn(reader::run(
            frames,
            Arc::downgrade(&connection),
            connection.shutdown_signal(),
        ));

        Client {
            connection,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Server-assigned session id.
    pub fn session_id(&self) -> Uuid {
        self.connection.session().id
    }

    /// Encoding the server selected.
    pub fn encoding(&self) -> Encoding {
        self.connection.session().encoding
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Whether requests can be issued.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.connection.correlator().len()
    }

    /// Number of live subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.connection.router().len()
    }

    /// Check the server is alive.
    pub async fn ping(&self) -> Result<()> {
        match self.call(|id| ClientMessage::Ping { id }).await? {
            ServerMessage::Pong { .. } => Ok(()),
            other => Err(unexpected("pong", &other)),
        }
    }

    /// Run a query and deserialize its result.
    pub async fn query<T: DeserializeOwned>(&self, query: &str) -> Result<T> {
        require("query", query)?;
        let query = query.to_string();
        let data = result_data(self.call(|id| ClientMessage::Query { id, query }).await?)?;
        from_data(data)
    }

    /// Insert a document; `data` must serialize to an object.
    pub async fn insert<T: Serialize + ?Sized>(&self, collection: &str, data: &T) -> Result<Document> {
        require("collection", collection)?;
        let data = object(data)?;
        let collection = collection.to_string();

        let reply = self
            .call(|id| ClientMessage::Insert {
                id,
                collection,
                data,
            })
            .await?;
        from_data(result_data(reply)?)
    }

    /// Replace a document's data.
    ///
    /// Fails with `NotFound` if the server has no such document.
    pub async fn update<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        document_id: &str,
        data: &T,
    ) -> Result<Document> {
        require("collection", collection)?;
        require("document id", document_id)?;
        let data = object(data)?;
        let (collection, document_id) = (collection.to_string(), document_id.to_string());

        let reply = self
            .call(|id| ClientMessage::Update {
                id,
                collection: collection.clone(),
                document_id: document_id.clone(),
                data,
            })
            .await?;
        found(result_data(reply)?, &collection, &document_id)
    }

    /// Delete a document, returning its last state.
    ///
    /// Fails with `NotFound` if the server has no such document.
    pub async fn delete(&self, collection: &str, document_id: &str) -> Result<Document> {
        require("collection", collection)?;
        require("document id", document_id)?;
        let (collection, document_id) = (collection.to_string(), document_id.to_string());

        let reply = self
            .call(|id| ClientMessage::Delete {
                id,
                collection: collection.clone(),
                document_id: document_id.clone(),
            })
            .await?;
        found(result_data(reply)?, &collection, &document_id)
    }

    /// Names of all collections.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let data = result_data(self.call(|id| ClientMessage::ListCollections { id }).await?)?;
        from_data(data)
    }

    /// Open a change feed.
    ///
    /// `callback` runs on the reader task for every change, in arrival order,
    /// and must not block: frames behind it wait until it returns.
    pub async fn subscribe<F>(&self, query: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        require("query", query)?;
        let query = query.to_string();
        let callback: ChangeCallback = Arc::new(callback);

        let (id, reply) = self
            .connection
            .request(|id| ClientMessage::Subscribe { id, query }, Some(callback))
            .await?;

        // The reader routed the id when the reply arrived; undo that if we reject it.
        if let Err(e) = into_message(&reply) {
            self.connection.router().unsubscribe(&id);
            return Err(e);
        }

        tracing::debug!(subscription_id = %id, "subscribed");
        Ok(Subscription {
            id,
            connection: Arc::downgrade(&self.connection),
        })
    }

    /// Close a change feed. Same as [`Subscription::unsubscribe`].
    pub async fn unsubscribe(&self, subscription: &Subscription) {
        subscription.unsubscribe().await;
    }

    /// Close the connection and wait for the reader task to finish.
    ///
    /// Pending requests fail with `ConnectionClosed`. Idempotent.
    pub async fn disconnect(&self) {
        self.connection.close().await;

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                tracing::warn!(error = %e, "reader task ended abnormally");
            }
        }
    }

    async fn call<F>(&self, build: F) -> Result<ServerMessage>
    where
        F: FnOnce(String) -> ClientMessage,
    {
        let (_, reply) = self.connection.request(build, None).await?;
        into_message(&reply)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.connection.signal_shutdown();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session_id", &self.session_id())
            .field("encoding", &self.encoding())
            .field("state", &self.state())
            .finish()
    }
}

/// Handle on an open change feed.
///
/// Dropping the handle leaves the feed running; call [`unsubscribe`](Self::unsubscribe)
/// to stop it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: String,
    connection: Weak<Connection>,
}

impl Subscription {
    /// Subscription id (the id of the subscribe request).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether changes are still being routed to the callback.
    pub fn is_active(&self) -> bool {
        self.connection
            .upgrade()
            .map_or(false, |conn| conn.router().contains(&self.id))
    }

    /// Stop routing changes and tell the server, without waiting for an answer.
    ///
    /// Safe to call more than once, and on a closed connection.
    pub async fn unsubscribe(&self) {
        let conn = match self.connection.upgrade() {
            Some(conn) => conn,
            None => return,
        };

        conn.router().unsubscribe(&self.id);

        if conn.is_connected() {
            let message = ClientMessage::Unsubscribe {
                id: self.id.clone(),
            };
            if let Err(e) = conn.send_unacknowledged(&message).await {
                tracing::debug!(subscription_id = %self.id, error = %e, "unsubscribe not sent");
            }
        }
    }
}

/// Decode a reply, turning error payloads into `ServerError`.
fn into_message(reply: &Reply) -> Result<ServerMessage> {
    match reply.decode::<ServerMessage>()? {
        ServerMessage::Error { error, .. } => Err(Error::ServerError(error)),
        message => Ok(message),
    }
}

fn result_data(message: ServerMessage) -> Result<Value> {
    match message {
        ServerMessage::Result { data, .. } => Ok(data),
        other => Err(unexpected("result", &other)),
    }
}

fn unexpected(expected: &str, got: &ServerMessage) -> Error {
    Error::DecodeFailed(format!(
        "expected {} reply, got {}",
        expected,
        got.kind()
    ))
}

fn from_data<T: DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| Error::DecodeFailed(e.to_string()))
}

fn found(data: Value, collection: &str, document_id: &str) -> Result<Document> {
    if data.is_null() {
        return Err(Error::NotFound(format!(
            "document {} in collection {}",
            document_id, collection
        )));
    }
    from_data(data)
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn object<T: Serialize + ?Sized>(data: &T) -> Result<Value> {
    let value = serde_json::to_value(data).map_err(|e| Error::EncodeFailed(e.to_string()))?;
    if !value.is_object() {
        return Err(Error::InvalidArgument(
            "document data must be an object".to_string(),
        ));
    }
    Ok(value)
}
