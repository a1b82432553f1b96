//! Routes framed serial data to every connected WebSocket client.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use serial_link::LinkEvent;

use crate::registry::{ClientRegistry, ClientSession};

/// Fans frames out to the client set and manages WebSocket sessions.
pub struct Broker {
    registry: Arc<ClientRegistry>,
}

impl Broker {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Long-running pump: link events in, broadcasts out.
    pub async fn run(self: Arc<Self>, events: flume::Receiver<LinkEvent>) {
        while let Ok(event) = events.recv_async().await {
            match event {
                LinkEvent::Connected => info!("serial link established"),
                LinkEvent::Disconnected => warn!("serial link lost, reconnect scheduled"),
                LinkEvent::Frame(line) => self.broadcast(&line),
            }
        }
        info!("link event channel closed, broker stopping");
    }

    /// Best-effort delivery of one frame to every open session.
    ///
    /// Iterates a snapshot so clients may come and go mid-broadcast; a
    /// failed send drops that client and delivery continues with the rest.
    pub fn broadcast(&self, frame: &str) {
        let targets = self.registry.snapshot();
        if targets.is_empty() {
            debug!("no clients connected, dropping frame");
            return;
        }
        for (id, tx) in targets {
            if tx.send(frame.to_owned()).is_err() {
                warn!("client {id} unreachable, removing");
                self.registry.unregister(id);
            }
        }
    }

    /// Wires up a newly accepted WebSocket.
    pub async fn add_client(&self, socket: WebSocket) {
        let (mut ws_tx, mut ws_rx) = socket.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let session = ClientSession::new(tx);
        let id = session.id();
        self.registry.register(session);
        info!("client {id} connected, {} total", self.registry.len());

        // Connection ack, sent once per client independent of broadcast.
        // A failed ack is logged; the client stays registered.
        if let Err(e) = ws_tx.send(Message::Text("connected".to_string())).await {
            warn!("failed to send connection ack to client {id}: {e}");
        }

        // Writer: drains broadcast frames into this client's socket.
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if ws_tx.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
        });

        // Reader: clients send no application data; watch for close.
        let registry = self.registry.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
            registry.unregister(id);
            info!("client {id} disconnected, {} total", registry.len());
        });
    }
}
