//! Chat WebSocket connection
//!
//! Every connection runs two tasks for its whole lifetime:
//!
//! - the reader forwards inbound messages to the registry and watches the
//!   pong deadline,
//! - the writer drains the connection's outbound queue and sends pings.
//!
//! When either task ends the connection is torn down and unregistered.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::server::AppState;
use crate::config::ConnectionConfig;
use crate::error::{RelayError, Result};
use crate::hub::{ClientHandle, ClientId, Message, RegistryHandle};

/// Write-side lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Outbound queue open, messages and pings are being written
    Active,
    /// Registry closed the queue; everything queued has been written and
    /// only the close frame is left
    Draining,
    /// Terminal, the writer is done
    Closed,
}

/// WebSocket handler for the chat relay
pub async fn chat_ws(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let config = state.connection.clone();

    ws.max_message_size(config.max_message_size)
        .max_frame_size(config.max_message_size)
        .on_failed_upgrade(move |e| warn!(%peer, "WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| handle_socket(socket, peer, state.registry, config))
}

/// Drive one connection from registration to teardown
async fn handle_socket(
    socket: WebSocket,
    peer: SocketAddr,
    registry: RegistryHandle,
    config: ConnectionConfig,
) {
    let (client, outbound) = ClientHandle::new(config.send_buffer);
    let id = client.id();

    if registry.register(client).await.is_err() {
        debug!(%peer, "Registry closed, dropping new connection");
        return;
    }

    info!(client = %id, %peer, "Chat WebSocket connected");

    let (sink, stream) = socket.split();
    let mut write_task = tokio::spawn(write_pump(sink, outbound, id, config.clone()));
    let mut read_task = tokio::spawn(read_pump(stream, id, registry.clone(), config));

    tokio::select! {
        _ = &mut read_task => {
            // Reader already unregistered; the writer stops once its queue closes
            let _ = write_task.await;
        }
        _ = &mut write_task => {
            read_task.abort();
            let _ = read_task.await;
            let _ = registry.unregister(id).await;
        }
    }

    info!(client = %id, %peer, "Chat WebSocket disconnected");
}

/// Forward inbound messages to the registry until the connection fails
async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    id: ClientId,
    registry: RegistryHandle,
    config: ConnectionConfig,
) {
    match read_messages(&mut stream, &registry, config.pong_wait).await {
        Ok(()) => debug!(client = %id, "Peer closed the connection"),
        Err(e) if e.is_disconnect() => debug!(client = %id, "Read ended: {}", e),
        Err(e) => warn!(client = %id, "Read failed: {}", e),
    }

    let _ = registry.unregister(id).await;
}

async fn read_messages(
    stream: &mut SplitStream<WebSocket>,
    registry: &RegistryHandle,
    pong_wait: Duration,
) -> Result<()> {
    // Only pongs push the deadline forward
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let frame = match timeout_at(deadline, stream.next()).await {
            Err(_) => return Err(RelayError::ReadTimeout),
            Ok(None) => return Ok(()),
            Ok(Some(frame)) => frame?,
        };

        match frame {
            WsMessage::Text(text) => registry.broadcast(Message::normalize(&text)).await?,
            WsMessage::Binary(data) => match Message::from_utf8(&data) {
                Some(message) => registry.broadcast(message).await?,
                None => debug!("Dropping binary frame that is not UTF-8"),
            },
            WsMessage::Pong(_) => deadline = Instant::now() + pong_wait,
            // Answered by axum
            WsMessage::Ping(_) => {}
            WsMessage::Close(_) => return Ok(()),
        }
    }
}

/// Write queued messages and keepalive pings until the queue closes or a
/// write fails. Returns the write error that closed the connection, if any.
async fn write_pump<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Message>,
    id: ClientId,
    config: ConnectionConfig,
) -> Result<()>
where
    S: Sink<WsMessage, Error = axum::Error> + Unpin,
{
    let mut ping = interval_at(Instant::now() + config.ping_period, config.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = ClientState::Active;
    let mut outcome = Ok(());

    loop {
        let written = match state {
            ClientState::Active => tokio::select! {
                next = outbound.recv() => match next {
                    Some(first) => {
                        let batch = drain_batch(first, &mut outbound);
                        let frame = WsMessage::Text(Message::join_frames(&batch));
                        send_frame(&mut sink, frame, config.write_wait)
                            .await
                            .map(|()| ClientState::Active)
                    }
                    None => Ok(ClientState::Draining),
                },
                _ = ping.tick() => {
                    send_frame(&mut sink, WsMessage::Ping(Vec::new()), config.write_wait)
                        .await
                        .map(|()| ClientState::Active)
                }
            },
            ClientState::Draining => {
                debug!(client = %id, "Outbound queue closed, sending close frame");
                let frame = WsMessage::Close(None);
                if let Err(e) = send_frame(&mut sink, frame, config.write_wait).await {
                    debug!(client = %id, "Close frame not delivered: {}", e);
                }
                Ok(ClientState::Closed)
            }
            ClientState::Closed => break,
        };

        state = match written {
            Ok(next) => next,
            Err(e) => {
                if e.is_disconnect() {
                    debug!(client = %id, "Write ended: {}", e);
                } else {
                    warn!(client = %id, "Write failed: {}", e);
                }
                outcome = Err(e);
                ClientState::Closed
            }
        };
    }

    outcome
}

/// Take `first` plus everything already queued behind it, so one frame
/// carries the whole backlog. Messages arriving meanwhile wait for the next
/// frame.
fn drain_batch(first: Message, outbound: &mut mpsc::Receiver<Message>) -> Vec<Message> {
    let pending = outbound.len();
    let mut batch = Vec::with_capacity(pending + 1);
    batch.push(first);

    for _ in 0..pending {
        match outbound.try_recv() {
            Ok(message) => batch.push(message),
            Err(_) => break,
        }
    }

    batch
}

async fn send_frame<S>(sink: &mut S, frame: WsMessage, write_wait: Duration) -> Result<()>
where
    S: Sink<WsMessage, Error = axum::Error> + Unpin,
{
    timeout(write_wait, sink.send(frame))
        .await
        .map_err(|_| RelayError::WriteTimeout)??;
    Ok(())
}
