//! End-to-end scenarios for the WebSocket server transport
//!
//! A real `McpServer` listens on an OS-assigned port; `tokio-tungstenite`
//! plays the client, one JSON-RPC message per text frame.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use strand_mcp::protocol::{Content, Tool};
use strand_mcp::transport::{WebSocketServerConfig, WebSocketServerTransport};
use strand_mcp::{McpServer, Session};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_server(config: WebSocketServerConfig) -> (McpServer, Session, SocketAddr) {
    let server = McpServer::builder()
        .server_info("ws-test-server", "1.0.0")
        .build();
    server
        .register_tool(Tool::new("echo", "Echo the input"), |args| async move {
            Ok(vec![Content::text(
                args["text"].as_str().unwrap_or_default().to_string(),
            )])
        })
        .await;

    let session = server
        .serve(WebSocketServerTransport::builder(config))
        .await
        .unwrap();
    let addr = session.local_addr().await.unwrap();
    (server, session, addr)
}

async fn next_json(socket: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(REPLY_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("socket errored");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            // The server pings for keepalive; tungstenite answers for us
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn send_json(socket: &mut WsClient, value: Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .unwrap();
}

async fn handshake(socket: &mut WsClient) {
    send_json(
        socket,
        json!({
            "jsonrpc": "2.0",
            "id": "init",
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "ws-client", "version": "0.1.0"}
            }
        }),
    )
    .await;
    let reply = next_json(socket).await;
    assert_eq!(reply["id"], "init");
    assert_eq!(reply["result"]["serverInfo"]["name"], "ws-test-server");

    send_json(
        socket,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
}

#[tokio::test]
async fn tool_call_over_text_frames() {
    let (_server, session, addr) = spawn_server(WebSocketServerConfig::localhost()).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    handshake(&mut socket).await;

    send_json(
        &mut socket,
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
    )
    .await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["result"]["tools"][0]["name"], "echo");

    send_json(
        &mut socket,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"text": "over websocket"}}
        }),
    )
    .await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["result"]["content"][0]["text"], "over websocket");

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn binary_frames_are_ignored() {
    let (_server, session, addr) = spawn_server(WebSocketServerConfig::localhost()).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    handshake(&mut socket).await;

    socket
        .send(Message::Binary(vec![0xde, 0xad, 0xbe, 0xef]))
        .await
        .unwrap();

    // The connection survives and keeps serving requests
    send_json(
        &mut socket,
        json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}),
    )
    .await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["id"], 3);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn bearer_auth_is_enforced_at_upgrade() {
    let config = WebSocketServerConfig::localhost().with_auth_token("sesame");
    let (_server, session, addr) = spawn_server(config).await;
    let url = format!("ws://{addr}/");

    // No token: the upgrade is refused
    let err = connect_async(&url).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }

    // Correct token: the upgrade succeeds
    let mut request = url.clone().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Authorization", "Bearer sesame".parse().unwrap());
    let (mut socket, _) = connect_async(request).await.unwrap();
    handshake(&mut socket).await;

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn origin_allow_list_is_enforced() {
    let config = WebSocketServerConfig::localhost().with_origin("https://app.example");
    let (_server, session, addr) = spawn_server(config).await;
    let url = format!("ws://{addr}/");

    let mut request = url.clone().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://evil.example".parse().unwrap());
    let err = connect_async(request).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 403);
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }

    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://app.example".parse().unwrap());
    let (mut socket, _) = connect_async(request).await.unwrap();
    handshake(&mut socket).await;

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn second_client_is_refused() {
    let (_server, session, addr) = spawn_server(WebSocketServerConfig::localhost()).await;
    let url = format!("ws://{addr}/");

    let (mut first, _) = connect_async(&url).await.unwrap();
    handshake(&mut first).await;

    let err = connect_async(&url).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 409);
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }

    // Closing the first connection frees the slot
    first.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (mut third, _) = connect_async(&url).await.unwrap();
    handshake(&mut third).await;

    session.disconnect().await.unwrap();
}
