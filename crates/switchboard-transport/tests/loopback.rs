//! Integration tests for the transports against real loopback listeners.
//!
//! Each test binds a listener on `127.0.0.1:0` (the OS picks a free port),
//! connects through the connector under test, and checks bytes flow both
//! ways and that a remote close surfaces as `Ok(None)`.

use switchboard_transport::{Connection, Connector, TcpConnector};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_tcp_connect_send_and_receive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let n = socket.read(&mut buf).await.unwrap();
        socket.write_all(b"USR 1 OK alice@example.com Alice\r\n").await.unwrap();
        buf[..n].to_vec()
    });

    let conn = TcpConnector
        .connect("127.0.0.1", port)
        .await
        .expect("should connect");
    assert!(conn.id().into_inner() > 0);

    conn.send(b"USR 1 alice@example.com 12345\r\n")
        .await
        .expect("send should succeed");

    let received = conn
        .recv()
        .await
        .expect("recv should succeed")
        .expect("should have data");
    assert_eq!(received, b"USR 1 OK alice@example.com Alice\r\n");

    let seen_by_server = server.await.unwrap();
    assert_eq!(seen_by_server, b"USR 1 alice@example.com 12345\r\n");
}

#[tokio::test]
async fn test_tcp_recv_returns_none_on_remote_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let conn = TcpConnector.connect("127.0.0.1", port).await.unwrap();
    server.await.unwrap();

    let result = conn.recv().await.expect("recv should not error");
    assert!(result.is_none(), "should return None on remote close");
}

#[tokio::test]
async fn test_tcp_connect_refused_returns_error() {
    // Bind then drop so the port is (almost certainly) closed.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = TcpConnector.connect("127.0.0.1", port).await;
    assert!(result.is_err());
}

#[cfg(feature = "websocket")]
mod tunnel {
    use futures_util::{SinkExt, StreamExt};
    use switchboard_transport::{Connection, Connector, TunnelConnector};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn test_tunnel_relays_bytes_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let gateway = listener.local_addr().unwrap().to_string();

        // A stand-in gateway: accept the upgrade, echo one frame back
        // with a prefix, then close.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let frame = ws.next().await.unwrap().unwrap();
            let mut reply = b"ACK ".to_vec();
            reply.extend_from_slice(&frame.into_data());
            ws.send(Message::Binary(reply.into())).await.unwrap();
            ws.send(Message::Close(None)).await.unwrap();
        });

        let conn = TunnelConnector::new(gateway)
            .connect("10.0.0.1", 1863)
            .await
            .expect("should connect through gateway");

        conn.send(b"7\r\n").await.unwrap();

        let echoed = conn.recv().await.unwrap().expect("should have data");
        assert_eq!(echoed, b"ACK 7\r\n");

        let closed = conn.recv().await.unwrap();
        assert!(closed.is_none());

        server.await.unwrap();
    }
}
