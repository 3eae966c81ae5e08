//! In-process fake server for client tests.
//!
//! Each test binds a loopback listener, connects a real [`Client`] to it and
//! drives the server side by hand through a [`Peer`].

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use squirreldb_client::codec;
use squirreldb_client::protocol::{encode_frame, Encoding, FrameReader, MessageType};
use squirreldb_client::{Client, ClientBuilder, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

/// Session id every fake handshake hands out.
pub const SESSION_ID: [u8; 16] = [
    0x55, 0x0e, 0x84, 0x00, 0xe2, 0x9b, 0x41, 0xd4, 0xa7, 0x16, 0x44, 0x66, 0x55, 0x44, 0x00, 0x00,
];

/// Canonical form of [`SESSION_ID`].
pub const SESSION_ID_STR: &str = "550e8400-e29b-41d4-a716-446655440000";

/// Handshake status bytes.
pub const STATUS_OK: u8 = 0x00;
pub const STATUS_VERSION_MISMATCH: u8 = 0x01;
pub const STATUS_AUTH_FAILED: u8 = 0x02;

/// How the fake server answers the handshake.
#[derive(Debug, Clone, Copy)]
pub struct Handshake {
    pub status: u8,
    pub version: u8,
    pub select_msgpack: bool,
}

impl Handshake {
    pub fn ok(encoding: Encoding) -> Self {
        Self {
            status: STATUS_OK,
            version: 0x01,
            select_msgpack: encoding == Encoding::MessagePack,
        }
    }

    pub fn status(status: u8) -> Self {
        Self {
            status,
            version: 0x01,
            select_msgpack: true,
        }
    }
}

/// Server side of one accepted connection.
pub struct Peer {
    frames: FrameReader<OwnedReadHalf>,
    write: OwnedWriteHalf,
    pub encoding: Encoding,
    /// Flags byte the client offered.
    pub offered_flags: u8,
    /// Credential bytes the client sent.
    pub credential: Vec<u8>,
}

impl Peer {
    /// Next request payload, or `None` once the client has gone.
    pub async fn recv(&mut self) -> Option<Value> {
        let frame = self.frames.next_frame().await.ok()??;
        assert_eq!(frame.message_type(), Some(MessageType::Request));
        let encoding = frame.encoding().expect("known encoding tag");
        assert_eq!(encoding, self.encoding);
        Some(codec::decode(encoding, frame.payload()).expect("decodable request"))
    }

    /// Next request payload, failing the test if none arrives in time.
    pub async fn expect(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.recv())
            .await
            .expect("request within 5s")
            .expect("connection still open")
    }

    /// Send a response frame.
    pub async fn reply(&mut self, payload: Value) {
        self.send(MessageType::Response, payload).await;
    }

    /// Send a notification frame.
    pub async fn push(&mut self, payload: Value) {
        self.send(MessageType::Notification, payload).await;
    }

    /// Send raw frame bytes.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.write.write_all(bytes).await.expect("write to client");
    }

    async fn send(&mut self, message_type: MessageType, payload: Value) {
        let bytes = codec::encode(self.encoding, &payload).expect("encodable payload");
        let frame = encode_frame(message_type, self.encoding, &bytes).expect("frame");
        self.send_raw(&frame).await;
    }

    /// Whether the client closed its side.
    pub async fn closed_by_client(&mut self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.frames.next_frame()).await,
            Ok(Ok(None)) | Ok(Err(_))
        )
    }
}

/// Bind a loopback listener on an ephemeral port.
pub async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

/// Accept one connection and answer its handshake.
pub async fn accept(listener: &TcpListener, handshake: Handshake) -> Peer {
    let (mut stream, _) = listener.accept().await.expect("accept");

    let mut head = [0u8; 8];
    stream.read_exact(&mut head).await.expect("handshake head");
    assert_eq!(&head[..4], b"SQRL");
    let len = u16::from_be_bytes([head[6], head[7]]) as usize;
    let mut credential = vec![0u8; len];
    stream
        .read_exact(&mut credential)
        .await
        .expect("handshake credential");

    let mut response = Vec::with_capacity(19);
    response.push(handshake.status);
    response.push(handshake.version);
    response.push(u8::from(handshake.select_msgpack));
    response.extend_from_slice(&SESSION_ID);
    stream.write_all(&response).await.expect("handshake response");

    let encoding = if handshake.select_msgpack {
        Encoding::MessagePack
    } else {
        Encoding::Json
    };

    let (read, write) = stream.into_split();
    Peer {
        frames: FrameReader::new(read, 16 * 1024 * 1024),
        write,
        encoding,
        offered_flags: head[5],
        credential,
    }
}

/// Connect `builder` to a fresh fake server.
pub async fn connect_with(builder: ClientBuilder, handshake: Handshake) -> (Result<Client>, Peer) {
    let (listener, addr) = listen().await;
    tokio::join!(builder.connect(addr), accept(&listener, handshake))
}

/// Connected client and peer, with the given request timeout.
pub async fn pair(encoding: Encoding, request_timeout: Duration) -> (Client, Peer) {
    let builder = Client::builder()
        .encoding(encoding)
        .request_timeout(request_timeout);
    let (client, peer) = connect_with(builder, Handshake::ok(encoding)).await;
    (client.expect("client connects"), peer)
}

/// Pull `id` out of a request payload.
pub fn id_of(request: &Value) -> String {
    request["id"].as_str().expect("string id").to_string()
}

/// A document payload as the server renders it.
pub fn document(id: &str, collection: &str, data: Value) -> Value {
    serde_json::json!({
        "id": id,
        "collection": collection,
        "data": data,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z",
    })
}
