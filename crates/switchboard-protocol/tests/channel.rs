//! Integration tests: a command channel over a real loopback TCP socket.
//!
//! The "server" side is a bare `TcpListener` writing raw protocol bytes,
//! so these tests also cover framing across arbitrary chunk boundaries.

use switchboard_protocol::{Command, CommandChannel, Inbound, MAX_LINE_LEN, MAX_PAYLOAD_LEN, Verb};
use switchboard_transport::{Connector, TcpConnector};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn connected_pair() -> (CommandChannel, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let conn = TcpConnector.connect("127.0.0.1", port).await.unwrap();
    let server = accept.await.unwrap();

    (CommandChannel::open(conn), server)
}

async fn expect_message(channel: &mut CommandChannel) -> switchboard_protocol::ProtocolMessage {
    match channel.recv().await {
        Inbound::Message(msg) => msg,
        Inbound::Closed => panic!("channel closed unexpectedly"),
    }
}

#[tokio::test]
async fn test_channel_writes_framed_commands() {
    let (mut channel, mut server) = connected_pair().await;

    channel.send(&Command::presentation("me@example.com", "17.42")).unwrap();
    channel.send(&Command::message("A", b"hi".to_vec())).unwrap();

    let expected = b"USR 1 me@example.com 17.42\r\nMSG 2 A 2\r\nhi";
    let mut received = vec![0u8; expected.len()];
    server.read_exact(&mut received).await.unwrap();
    assert_eq!(&received[..], &expected[..]);
}

#[tokio::test]
async fn test_channel_reassembles_split_frames() {
    let (mut channel, mut server) = connected_pair().await;

    // One MSG split mid-line and mid-payload, followed by a JOI.
    server.write_all(b"MSG bob@example.com Bo").await.unwrap();
    server.flush().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    server.write_all(b"b 5\r\nhel").await.unwrap();
    server.flush().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    server.write_all(b"loJOI carol@example.com Carol\r\n").await.unwrap();

    let msg = expect_message(&mut channel).await;
    assert_eq!(msg.verb, Verb::Msg);
    assert_eq!(msg.tid, "bob@example.com");
    assert_eq!(msg.params, vec!["Bob"]);
    assert_eq!(msg.payload.as_deref(), Some(&b"hello"[..]));

    let msg = expect_message(&mut channel).await;
    assert_eq!(msg.verb, Verb::Joi);
    assert_eq!(msg.tid, "carol@example.com");
}

#[tokio::test]
async fn test_channel_skips_undecodable_line() {
    let (mut channel, mut server) = connected_pair().await;

    server
        .write_all(b"MSG bob@example.com Bob notanumber\r\nACK 1\r\n")
        .await
        .unwrap();

    let msg = expect_message(&mut channel).await;
    assert_eq!(msg.verb, Verb::Ack);
}

#[tokio::test]
async fn test_channel_closes_on_oversized_payload_without_decoding_it() {
    let (mut channel, mut server) = connected_pair().await;

    let mut bytes = format!(
        "ACK 1\r\nMSG bob@example.com Bob {}\r\n",
        MAX_PAYLOAD_LEN + 1
    )
    .into_bytes();
    bytes.extend_from_slice(b"x\r\nBYE alice@example.com\r\n");
    server.write_all(&bytes).await.unwrap();

    let msg = expect_message(&mut channel).await;
    assert_eq!(msg.verb, Verb::Ack);
    assert_eq!(channel.recv().await, Inbound::Closed);

    // The client hung up: EOF, or a reset if our bytes were still unread.
    let mut scratch = [0u8; 64];
    assert!(matches!(server.read(&mut scratch).await, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_channel_closes_on_line_without_terminator() {
    let (mut channel, mut server) = connected_pair().await;

    server.write_all(&vec![b'a'; MAX_LINE_LEN + 1]).await.unwrap();

    assert_eq!(channel.recv().await, Inbound::Closed);
    assert!(channel.is_closed());
}

#[tokio::test]
async fn test_channel_reports_closed_when_server_hangs_up() {
    let (mut channel, server) = connected_pair().await;

    drop(server);

    assert_eq!(channel.recv().await, Inbound::Closed);
    assert!(channel.is_closed());
}

#[tokio::test]
async fn test_channel_release_closes_socket() {
    let (mut channel, mut server) = connected_pair().await;

    channel.send(&Command::invite("bob@example.com")).unwrap();
    channel.release();

    // Everything queued before the release is still written, then EOF.
    let mut received = Vec::new();
    server.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"CAL 1 bob@example.com\r\n");
}
