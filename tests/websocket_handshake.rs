#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end tests against a scripted peer speaking real WebSocket on loopback.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use websocket_dist::config::ConnectionConfig;
use websocket_dist::core::digest::digest;
use websocket_dist::{DistError, DistFlags, Node};

const COOKIE: &str = "LJTPNYYQIOIRKYDCWCQH";
const CLIENT: &str = "client@localhost";
const SERVER: &str = "server@localhost";
const PEER_CHALLENGE: u32 = 1234;

type PeerSocket = WebSocketStream<TcpStream>;

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn accept(listener: &TcpListener) -> PeerSocket {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_binary(ws: &mut PeerSocket) -> Option<Vec<u8>> {
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Binary(data)) => return Some(data),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn drain(ws: &mut PeerSocket) {
    while next_binary(ws).await.is_some() {}
}

fn challenge_frame(flags: DistFlags, name: &str) -> Vec<u8> {
    let mut frame = vec![b'N'];
    frame.extend_from_slice(&flags.to_be_bytes());
    frame.extend_from_slice(&PEER_CHALLENGE.to_be_bytes());
    frame.extend_from_slice(&5u32.to_be_bytes());
    frame.extend_from_slice(&(name.len() as u16).to_be_bytes());
    frame.extend_from_slice(name.as_bytes());
    frame
}

/// Answer send-name with `status` and, if accepted, send a challenge.
async fn serve_until_challenge(ws: &mut PeerSocket, status: &str, name: &str) {
    let send_name = next_binary(ws).await.expect("send-name");
    assert_eq!(send_name[0], b'N');
    assert_eq!(&send_name[1..9], &DistFlags::ADVERTISED.to_be_bytes());

    let mut reply = vec![b's'];
    reply.extend_from_slice(status.as_bytes());
    ws.send(Message::Binary(reply)).await.unwrap();
    if status != "ok" {
        return;
    }
    ws.send(Message::Binary(challenge_frame(DistFlags::ADVERTISED, name)))
        .await
        .unwrap();
}

/// Play the peer side of a successful handshake.
async fn serve_handshake(ws: &mut PeerSocket) {
    serve_until_challenge(ws, "ok", SERVER).await;

    let reply = next_binary(ws).await.expect("challenge reply");
    assert_eq!(reply[0], b'r');
    assert_eq!(&reply[5..], &digest(COOKIE, PEER_CHALLENGE));

    let own = u32::from_be_bytes([reply[1], reply[2], reply[3], reply[4]]);
    let mut ack = vec![b'a'];
    ack.extend_from_slice(&digest(COOKIE, own));
    ws.send(Message::Binary(ack)).await.unwrap();
}

fn node_with(settings: ConnectionConfig) -> Node {
    Node::with_creation(CLIENT, COOKIE, 1).with_settings(settings)
}

#[tokio::test]
async fn test_connect_send_and_receive() {
    let (listener, addr) = listen().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve_handshake(&mut ws).await;

        // tick, stray text, then {2, ''} followed by payload 'hi'
        ws.send(Message::Binary(Vec::new())).await.unwrap();
        ws.send(Message::Text("ignored".into())).await.unwrap();
        ws.send(Message::Binary(vec![
            131, 68, 0, 104, 2, 97, 2, 119, 0, 100, 0, 2, b'h', b'i',
        ]))
        .await
        .unwrap();

        next_binary(&mut ws).await.expect("REG_SEND frame")
    });

    let node = Node::with_creation(CLIENT, COOKIE, 1);
    let conn = node.connect(&addr, SERVER).await.unwrap();
    assert_eq!(conn.peer_name(), SERVER);
    assert_eq!(conn.peer_creation(), 5);
    assert_eq!(conn.local_name(), CLIENT);
    assert!(conn.peer_flags().contains(DistFlags::MANDATORY_25_DIGEST));

    conn.send("foo", &[97, 1]).unwrap();

    let message = conn.receive().await.unwrap();
    assert_eq!(message.opcode().unwrap(), 2);
    assert_eq!(&message.control()[..], &[104, 2, 97, 2, 119, 0]);
    assert_eq!(&message.payload()[..], &[100, 0, 2, b'h', b'i']);

    let mut expected = vec![131, 68, 0, 104, 4, 97, 6, 88, 119, CLIENT.len() as u8];
    expected.extend_from_slice(CLIENT.as_bytes());
    expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    expected.extend_from_slice(&[119, 0, 119, 3, b'f', b'o', b'o', 97, 1]);
    assert_eq!(server.await.unwrap(), expected);
}

#[tokio::test]
async fn test_full_url_is_used_verbatim() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve_handshake(&mut ws).await;
        drain(&mut ws).await;
    });

    let node = Node::with_creation(CLIENT, COOKIE, 1);
    let conn = node
        .connect(&format!("ws://{addr}/dist"), SERVER)
        .await
        .unwrap();
    conn.close();
    server.await.unwrap();
}

#[tokio::test]
async fn test_wrong_peer_name_over_websocket() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve_until_challenge(&mut ws, "ok", "impostor@localhost").await;
        // the client must not answer the challenge
        assert!(next_binary(&mut ws).await.is_none());
    });

    let node = Node::with_creation(CLIENT, COOKIE, 1);
    let result = node.connect(&addr, SERVER).await;
    assert!(matches!(result, Err(DistError::WrongPeerName(ref n)) if n == "impostor@localhost"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_status_rejected_over_websocket() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve_until_challenge(&mut ws, "alive", SERVER).await;
        drain(&mut ws).await;
    });

    let node = Node::with_creation(CLIENT, COOKIE, 1);
    let result = node.connect(&addr, SERVER).await;
    assert!(matches!(result, Err(DistError::StatusRejected(ref s)) if s == "alive"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_refused_connection_is_socket_error() {
    let (listener, addr) = listen().await;
    drop(listener);

    let node = Node::with_creation(CLIENT, COOKIE, 1);
    let result = node.connect(&addr, SERVER).await;
    assert!(matches!(result, Err(DistError::SocketError(_))));
}

#[tokio::test]
async fn test_silent_peer_hits_connect_timeout() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        drain(&mut ws).await;
    });

    let node = node_with(ConnectionConfig {
        connect_timeout: Duration::from_millis(200),
        ..ConnectionConfig::default()
    });
    let result = node.connect(&addr, SERVER).await;
    assert!(matches!(result, Err(DistError::Timeout)));

    // the abandoned socket is released
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("peer sees the socket go away")
        .unwrap();
}

#[tokio::test]
async fn test_ticks_do_not_reset_receive_timeout() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve_handshake(&mut ws).await;
        for _ in 0..50 {
            if ws.send(Message::Binary(Vec::new())).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let node = node_with(ConnectionConfig {
        receive_timeout: Some(Duration::from_millis(150)),
        ..ConnectionConfig::default()
    });
    let conn = node.connect(&addr, SERVER).await.unwrap();
    assert!(matches!(conn.receive().await, Err(DistError::Timeout)));
    assert!(conn.is_closed());

    drop(conn);
    server.await.unwrap();
}

#[tokio::test]
async fn test_peer_close_ends_receive() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve_handshake(&mut ws).await;
        ws.close(None).await.unwrap();
    });

    let node = Node::with_creation(CLIENT, COOKIE, 1);
    let conn = node.connect(&addr, SERVER).await.unwrap();
    server.await.unwrap();

    assert!(matches!(
        conn.receive().await,
        Err(DistError::ConnectionClosed) | Err(DistError::SocketError(_))
    ));
}
