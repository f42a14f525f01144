//! Transport selection: which connector a session uses.
//!
//! A direct socket is the default. Either an explicit proxy or forced HTTP
//! tunnelling switches every switchboard connection to the tunnelled
//! transport.

use serde::{Deserialize, Serialize};

use crate::{Connection, ConnectionId, Connector, TcpConnection, TcpConnector, TransportError};
#[cfg(feature = "websocket")]
use crate::{TunnelConnection, TunnelConnector};

/// Default HTTP gateway used when tunnelling without a proxy.
pub const DEFAULT_GATEWAY: &str = "gateway.messenger.hotmail.com:80";

/// An HTTP proxy to tunnel through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

/// Transport settings for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Force the tunnelled transport even without a proxy.
    pub use_http: bool,

    /// Tunnel through this proxy. Implies tunnelling.
    pub proxy: Option<ProxyConfig>,

    /// Gateway (`host:port`) used for tunnelling when no proxy is set.
    pub gateway: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            use_http: false,
            proxy: None,
            gateway: DEFAULT_GATEWAY.to_string(),
        }
    }
}

impl TransportConfig {
    /// Returns `true` if connections must go through the HTTP tunnel.
    pub fn is_tunnelled(&self) -> bool {
        self.use_http || self.proxy.is_some()
    }

    /// The `host:port` the tunnel upgrades through.
    pub fn tunnel_endpoint(&self) -> String {
        match &self.proxy {
            Some(proxy) => format!("{}:{}", proxy.host, proxy.port),
            None => self.gateway.clone(),
        }
    }
}

/// Either transport, chosen at runtime from a [`TransportConfig`].
#[derive(Debug, Clone)]
pub enum AnyConnector {
    Direct(TcpConnector),
    #[cfg(feature = "websocket")]
    Tunnel(TunnelConnector),
}

impl AnyConnector {
    /// Picks the connector the config asks for.
    ///
    /// # Errors
    /// Returns [`TransportError::Unavailable`] if tunnelling is requested
    /// but the `websocket` feature is disabled.
    pub fn from_config(
        config: &TransportConfig,
    ) -> Result<Self, TransportError> {
        if !config.is_tunnelled() {
            return Ok(Self::Direct(TcpConnector));
        }
        #[cfg(feature = "websocket")]
        {
            Ok(Self::Tunnel(TunnelConnector::new(config.tunnel_endpoint())))
        }
        #[cfg(not(feature = "websocket"))]
        {
            Err(TransportError::Unavailable("websocket"))
        }
    }
}

impl Connector for AnyConnector {
    type Connection = AnyConnection;
    type Error = TransportError;

    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Self::Connection, Self::Error> {
        match self {
            Self::Direct(c) => c.connect(host, port).await.map(AnyConnection::Direct),
            #[cfg(feature = "websocket")]
            Self::Tunnel(c) => c.connect(host, port).await.map(AnyConnection::Tunnel),
        }
    }
}

/// The connection produced by [`AnyConnector`].
pub enum AnyConnection {
    Direct(TcpConnection),
    #[cfg(feature = "websocket")]
    Tunnel(TunnelConnection),
}

impl Connection for AnyConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        match self {
            Self::Direct(c) => c.send(data).await,
            #[cfg(feature = "websocket")]
            Self::Tunnel(c) => c.send(data).await,
        }
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        match self {
            Self::Direct(c) => c.recv().await,
            #[cfg(feature = "websocket")]
            Self::Tunnel(c) => c.recv().await,
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        match self {
            Self::Direct(c) => c.close().await,
            #[cfg(feature = "websocket")]
            Self::Tunnel(c) => c.close().await,
        }
    }

    fn id(&self) -> ConnectionId {
        match self {
            Self::Direct(c) => c.id(),
            #[cfg(feature = "websocket")]
            Self::Tunnel(c) => c.id(),
        }
    }
}
