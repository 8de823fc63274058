//! WebSocket chat gateway using tokio-tungstenite.
//!
//! Clients speak JSON text frames. Inbound:
//! `{"type":"join","room":..}`, `{"type":"leave","room":..}`,
//! `{"type":"message","room":..,"body":..}`. Outbound:
//! `{"type":"message","room":..,"body":..}`, fanned out to every
//! connection that joined the room.

use super::{ChatEvent, ChatTransport};
use advent_core::{AdventError, AdventResult};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Buffered inbound events across all connections.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Buffered outbound frames per connection.
const OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Join { room: String },
    Leave { room: String },
    Message { room: String, body: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame<'a> {
    Message { room: &'a str, body: &'a str },
}

type Outbox = mpsc::Sender<String>;

/// Accepts WebSocket clients and routes room traffic.
pub struct WebSocketGateway {
    local_addr: SocketAddr,
    /// Room -> connection id -> outbound queue.
    rooms: RwLock<HashMap<String, HashMap<u64, Outbox>>>,
    next_conn_id: AtomicU64,
}

impl WebSocketGateway {
    /// Bind the listener and start accepting connections.
    ///
    /// Returns the gateway and the stream of inbound events.
    pub async fn bind(
        bind_addr: SocketAddr,
    ) -> AdventResult<(Arc<Self>, mpsc::Receiver<ChatEvent>)> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| AdventError::Transport(format!("WS bind failed: {e}")))?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "WebSocket gateway listening");

        let gateway = Arc::new(Self {
            local_addr,
            rooms: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        });
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let accepting = Arc::clone(&gateway);
        tokio::spawn(async move { accepting.accept_loop(listener, events_tx).await });

        Ok((gateway, events_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, events: mpsc::Sender<ChatEvent>) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let gateway = Arc::clone(&self);
                    let events = events.clone();
                    tokio::spawn(async move {
                        gateway.handle_connection(stream, addr, events).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        events: mpsc::Sender<ChatEvent>,
    ) {
        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                return;
            }
        };

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        debug!(remote = %addr, conn_id, "WebSocket connection accepted");

        let (mut sink, mut inbound) = ws_stream.split();
        let (outbox, mut outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbox_rx.recv().await {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let mut joined = HashSet::new();
        while let Some(message) = inbound.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                // Pings are answered by tungstenite; binary frames are ignored.
                Ok(_) => continue,
                Err(e) => {
                    warn!(conn_id, error = %e, "WS recv failed");
                    break;
                }
            };

            let event = match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Join { room }) => {
                    self.join(&room, conn_id, outbox.clone()).await;
                    joined.insert(room.clone());
                    ChatEvent::Joined { room }
                }
                Ok(ClientFrame::Leave { room }) => {
                    self.leave(&room, conn_id).await;
                    joined.remove(&room);
                    continue;
                }
                Ok(ClientFrame::Message { room, body }) => ChatEvent::Message { room, body },
                Err(e) => {
                    warn!(conn_id, error = %e, "invalid client frame");
                    continue;
                }
            };

            if events.send(event).await.is_err() {
                warn!("chat event channel closed");
                break;
            }
        }

        for room in joined {
            self.leave(&room, conn_id).await;
        }
        drop(outbox);
        let _ = writer.await;
        debug!(conn_id, "WebSocket connection closed");
    }

    async fn join(&self, room: &str, conn_id: u64, outbox: Outbox) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id, outbox);
        debug!(room, conn_id, "joined room");
    }

    async fn leave(&self, room: &str, conn_id: u64) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
        debug!(room, conn_id, "left room");
    }
}

impl ChatTransport for WebSocketGateway {
    async fn send_text(&self, room: &str, text: &str) -> AdventResult<()> {
        let frame = serde_json::to_string(&ServerFrame::Message { room, body: text })
            .map_err(|e| AdventError::Transport(format!("frame encode failed: {e}")))?;

        let outboxes: Vec<Outbox> = {
            let rooms = self.rooms.read().await;
            rooms
                .get(room)
                .map(|members| members.values().cloned().collect())
                .unwrap_or_default()
        };

        if outboxes.is_empty() {
            debug!(room, "no connections in room, dropping message");
            return Ok(());
        }
        for outbox in outboxes {
            if outbox.send(frame.clone()).await.is_err() {
                debug!(room, "connection went away before delivery");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    async fn next_event(events: &mut mpsc::Receiver<ChatEvent>) -> ChatEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn routes_room_traffic_both_ways() {
        let (gateway, mut events) = WebSocketGateway::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let url = format!("ws://{}", gateway.local_addr());
        let (mut client, _) = connect_async(url).await.unwrap();

        client
            .send(Message::Text(r#"{"type":"join","room":"cave"}"#.to_string().into()))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ChatEvent::Joined {
                room: "cave".into()
            }
        );

        client
            .send(Message::Text(
                r#"{"type":"message","room":"cave","body":"look"}"#.to_string().into(),
            ))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ChatEvent::Message {
                room: "cave".into(),
                body: "look".into()
            }
        );

        gateway.send_text("cave", "You are in a cave.").await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["room"], "cave");
        assert_eq!(value["body"], "You are in a cave.");
    }

    #[tokio::test]
    async fn ignores_malformed_frames_and_unjoined_rooms() {
        let (gateway, mut events) = WebSocketGateway::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let url = format!("ws://{}", gateway.local_addr());
        let (mut client, _) = connect_async(url).await.unwrap();

        client
            .send(Message::Text("not json".to_string().into()))
            .await
            .unwrap();
        client
            .send(Message::Text(
                r#"{"type":"message","room":"hall","body":"hi"}"#.to_string().into(),
            ))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ChatEvent::Message {
                room: "hall".into(),
                body: "hi".into()
            }
        );

        // Nobody joined "hall", so this is silently dropped.
        gateway.send_text("hall", "echo").await.unwrap();
        let nothing = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
        assert!(nothing.is_err());
    }
}
