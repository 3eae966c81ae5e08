//! TCP connection setup.

use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::{Error, Result};

/// Port the server listens on by default.
pub const DEFAULT_PORT: u16 = 8082;

/// Open a TCP connection to `addr`, bounded by `timeout`, with `TCP_NODELAY` set.
///
/// # Errors
///
/// - `Timeout` if the connect did not finish in time
/// - `ConnectFailed` on resolution or connect failure
pub async fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(Error::ConnectFailed)?;

    // Small request frames must not wait on Nagle.
    stream.set_nodelay(true).map_err(Error::ConnectFailed)?;

    tracing::debug!(peer = ?stream.peer_addr().ok(), "tcp connected");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_sets_nodelay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect(addr, Duration::from_secs(1)).await.unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(addr, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed(_)));
        assert_eq!(err.code(), 1);
    }
}
