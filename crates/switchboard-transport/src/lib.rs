//! Transport abstraction layer for switchboard connections.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the ways a client can reach a switchboard server:
//!
//! - **Direct** ([`TcpConnector`]): a plain TCP socket to `host:port`.
//! - **Tunnelled** ([`TunnelConnector`]): an HTTP-upgraded (WebSocket)
//!   stream through a gateway or proxy, for networks that only allow HTTP.
//!
//! [`TransportConfig`] decides which one is used, and [`AnyConnector`]
//! lets callers hold either behind a single concrete type.
//!
//! A transport only moves bytes. Framing those bytes into protocol
//! commands is the protocol layer's job.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — tunnelled transport via `tokio-tungstenite`

mod config;
mod error;
mod tcp;
#[cfg(feature = "websocket")]
mod websocket;

pub use config::{AnyConnection, AnyConnector, ProxyConfig, TransportConfig};
pub use error::TransportError;
pub use tcp::{TcpConnection, TcpConnector};
#[cfg(feature = "websocket")]
pub use websocket::{TunnelConnection, TunnelConnector};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of process-wide connection ids.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one transport connection in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens outbound connections to a switchboard server.
///
/// The returned futures are `Send` so a conversation actor that is
/// generic over its connector can still be handed to `tokio::spawn`.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;
    /// The error type for connect operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connects to the switchboard at `host:port`.
    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// One open byte stream to a switchboard (direct or tunnelled).
///
/// Both methods take `&self` so one task can wait in [`recv`](Self::recv)
/// while another sends.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends data to the remote peer. The whole buffer is written before
    /// the future resolves.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next chunk of bytes from the remote peer.
    ///
    /// Chunk boundaries carry no meaning. Returns `Ok(None)` when the
    /// connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}
