//! End-to-end relay tests over real WebSocket connections

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use relay::api::RelayServer;
use relay::config::{ConnectionConfig, ServerConfig};
use relay::{Registry, RegistryHandle};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

struct TestRelay {
    addr: SocketAddr,
    registry: RegistryHandle,
    shutdown: watch::Sender<bool>,
}

impl TestRelay {
    async fn start(connection: ConnectionConfig) -> Self {
        let (registry, handle) = Registry::new(64);
        let (shutdown, _) = watch::channel(false);
        tokio::spawn(registry.run(shutdown.subscribe()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::new(
            ServerConfig {
                addr: addr.to_string(),
            },
            connection,
            handle.clone(),
        );
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            server.serve(listener, server_shutdown).await.unwrap();
        });

        Self {
            addr,
            registry: handle,
            shutdown,
        }
    }

    async fn connect(&self) -> Client {
        let url = format!("ws://{}/ws", self.addr);
        let (client, _) = connect_async(url).await.expect("client failed to connect");
        client
    }

    async fn wait_connected(&self, expected: usize) {
        let mut rx = self.registry.subscribe_connected();
        timeout(WAIT, rx.wait_for(|n| *n == expected))
            .await
            .unwrap_or_else(|_| panic!("never reached {} connected clients", expected))
            .unwrap();
    }
}

/// Next text frame, skipping control frames
async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .expect("connection failed");
        match frame {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Collect `count` messages, splitting coalesced frames on newlines
async fn next_messages(client: &mut Client, count: usize) -> Vec<String> {
    let mut messages = Vec::new();
    while messages.len() < count {
        let text = next_text(client).await;
        messages.extend(text.split('\n').map(str::to_string));
    }
    messages
}

async fn expect_closed(client: &mut Client) {
    loop {
        match timeout(WAIT, client.next()).await {
            Err(_) => panic!("connection was not closed"),
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(Some(Ok(other))) => panic!("unexpected frame before close: {:?}", other),
        }
    }
}

fn fast_keepalive() -> ConnectionConfig {
    ConnectionConfig {
        write_wait: Duration::from_millis(200),
        pong_wait: Duration::from_millis(300),
        ping_period: Duration::from_millis(50),
        ..ConnectionConfig::default()
    }
}

#[tokio::test]
async fn test_message_reaches_every_participant() {
    let relay = TestRelay::start(ConnectionConfig::default()).await;

    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    let mut c = relay.connect().await;
    relay.wait_connected(3).await;

    a.send(Message::Text("hi".into())).await.unwrap();

    assert_eq!(next_text(&mut b).await, "hi");
    assert_eq!(next_text(&mut c).await, "hi");
    // The sender is a participant too
    assert_eq!(next_text(&mut a).await, "hi");
}

#[tokio::test]
async fn test_message_is_normalized_before_broadcast() {
    let relay = TestRelay::start(ConnectionConfig::default()).await;

    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    relay.wait_connected(2).await;

    a.send(Message::Text("  hello\nworld  ".into())).await.unwrap();

    assert_eq!(next_text(&mut b).await, "hello world");
}

#[tokio::test]
async fn test_burst_arrives_in_order_and_splits_cleanly() {
    let relay = TestRelay::start(ConnectionConfig::default()).await;

    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    relay.wait_connected(2).await;

    let sent: Vec<String> = (0..20).map(|i| format!("line {}", i)).collect();
    for text in &sent {
        a.send(Message::Text(text.clone())).await.unwrap();
    }

    assert_eq!(next_messages(&mut b, sent.len()).await, sent);
}

#[tokio::test]
async fn test_late_joiner_only_sees_later_messages() {
    let relay = TestRelay::start(ConnectionConfig::default()).await;

    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    relay.wait_connected(2).await;

    a.send(Message::Text("before".into())).await.unwrap();
    assert_eq!(next_text(&mut b).await, "before");

    let mut d = relay.connect().await;
    relay.wait_connected(3).await;

    a.send(Message::Text("after".into())).await.unwrap();
    assert_eq!(next_text(&mut d).await, "after");
    assert_eq!(next_text(&mut b).await, "after");
}

#[tokio::test]
async fn test_peer_close_unregisters_client() {
    let relay = TestRelay::start(ConnectionConfig::default()).await;

    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    relay.wait_connected(2).await;

    a.close(None).await.unwrap();
    relay.wait_connected(1).await;

    // The remaining participant keeps working
    b.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(next_text(&mut b).await, "still here");
}

#[tokio::test]
async fn test_oversize_message_drops_the_sender() {
    let relay = TestRelay::start(ConnectionConfig {
        max_message_size: 64,
        ..ConnectionConfig::default()
    })
    .await;

    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    relay.wait_connected(2).await;

    a.send(Message::Text("x".repeat(256))).await.unwrap();
    relay.wait_connected(1).await;
    expect_closed(&mut a).await;

    b.send(Message::Text("small".into())).await.unwrap();
    assert_eq!(next_text(&mut b).await, "small");
}

#[tokio::test]
async fn test_silent_peer_is_dropped_after_pong_deadline() {
    let relay = TestRelay::start(fast_keepalive()).await;

    // Never polled, so pings are never answered
    let _silent = relay.connect().await;
    relay.wait_connected(1).await;

    relay.wait_connected(0).await;
}

#[tokio::test]
async fn test_responsive_peer_survives_keepalive() {
    let relay = TestRelay::start(fast_keepalive()).await;

    let mut client = relay.connect().await;
    relay.wait_connected(1).await;

    // Polling the stream lets the client answer pings
    let reader = tokio::spawn(async move {
        let mut pings = 0;
        while let Some(Ok(frame)) = client.next().await {
            if let Message::Ping(_) = frame {
                pings += 1;
            }
        }
        pings
    });

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(relay.registry.connected(), 1);

    let _ = relay.shutdown.send(true);
    let pings = timeout(WAIT, reader).await.unwrap().unwrap();
    assert!(pings >= 2, "expected several pings, saw {}", pings);
}

#[tokio::test]
async fn test_shutdown_sends_close_to_participants() {
    let relay = TestRelay::start(ConnectionConfig::default()).await;

    let mut a = relay.connect().await;
    relay.wait_connected(1).await;

    relay.shutdown.send(true).unwrap();

    expect_closed(&mut a).await;
    assert_eq!(relay.registry.connected(), 0);
}

#[tokio::test]
async fn test_chat_page_is_served() {
    let relay = TestRelay::start(ConnectionConfig::default()).await;

    let mut stream = TcpStream::connect(relay.addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(
        &mut stream,
        b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await
    .unwrap();

    let mut response = Vec::new();
    timeout(
        WAIT,
        tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response),
    )
    .await
    .unwrap()
    .unwrap();

    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("new WebSocket"));
}
