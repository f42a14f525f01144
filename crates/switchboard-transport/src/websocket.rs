//! HTTP-tunnelled transport: a WebSocket upgrade through a gateway.
//!
//! Used when the network only lets HTTP out (forced tunnelling or a proxy).
//! The gateway relays the byte stream to the switchboard named in the
//! request URL.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, ConnectionId, Connector, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A [`Connector`] that reaches the switchboard through an HTTP gateway.
#[derive(Debug, Clone)]
pub struct TunnelConnector {
    gateway: String,
}

impl TunnelConnector {
    /// Creates a connector that upgrades through `gateway` (`host:port`).
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
        }
    }

    /// Builds the gateway URL asking it to open a switchboard session
    /// to `host:port`.
    pub fn url_for(&self, host: &str, port: u16) -> String {
        format!(
            "ws://{}/gateway/gateway.dll?Action=open&Server=SB&IP={host}:{port}",
            self.gateway
        )
    }
}

impl Connector for TunnelConnector {
    type Connection = TunnelConnection;
    type Error = TransportError;

    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Self::Connection, Self::Error> {
        let url = self.url_for(host, port);
        let (ws, _) =
            tokio_tungstenite::connect_async(url.as_str()).await.map_err(
                |e| TransportError::ConnectFailed {
                    addr: url.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        e,
                    ),
                },
            )?;
        let (sink, stream) = ws.split();
        let id = ConnectionId::next();
        tracing::debug!(%id, gateway = %self.gateway, host, port, "tunnel opened");
        Ok(TunnelConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single tunnelled connection.
pub struct TunnelConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for TunnelConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_names_switchboard_target() {
        let connector = TunnelConnector::new("gateway.example:80");
        assert_eq!(
            connector.url_for("207.46.1.1", 1863),
            "ws://gateway.example:80/gateway/gateway.dll?Action=open&Server=SB&IP=207.46.1.1:1863"
        );
    }
}
