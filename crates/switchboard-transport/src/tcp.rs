//! Direct TCP transport.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Connector, TransportError};

/// Size of the buffer handed to each socket read.
const READ_CHUNK: usize = 8 * 1024;

/// A [`Connector`] that opens plain TCP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Self::Connection, Self::Error> {
        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            TransportError::ConnectFailed {
                addr: format!("{host}:{port}"),
                source: e,
            }
        })?;
        // Commands are small and latency matters more than batching.
        let _ = stream.set_nodelay(true);
        let conn = TcpConnection::from_stream(stream);
        tracing::debug!(id = %conn.id, host, port, "TCP connection opened");
        Ok(conn)
    }
}

/// A TCP connection split into independently locked halves, so a pending
/// read never blocks a write.
pub struct TcpConnection {
    id: ConnectionId,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpConnection {
    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            id: ConnectionId::next(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await.map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut buf = vec![0u8; READ_CHUNK];
        let n = self
            .reader
            .lock()
            .await
            .read(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
