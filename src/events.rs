// Realtime event fan-out to connected streaming clients

use crate::types::ChatEvent;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Registry of currently-connected streaming clients.
///
/// Each client holds the receiving end of an unbounded channel carrying
/// ready-to-write SSE frames. Events are broadcast globally; there is no
/// per-client addressing. A client whose channel is closed (disconnected)
/// is pruned on the next broadcast without affecting the other deliveries.
pub struct EventBus {
    clients: RwLock<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new client and return its id plus the frame receiver.
    ///
    /// Dropping the receiver (client disconnect) closes the channel and the
    /// entry is removed on the next broadcast.
    pub async fn register_client(&self) -> (String, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut clients = self.clients.write().await;
        clients.insert(id.clone(), tx);
        tracing::debug!("Streaming client {} connected", id);

        (id, rx)
    }

    /// Explicit removal; idempotent. Dropping the sender ends the client's
    /// stream, closing the underlying connection.
    pub async fn unregister_client(&self, id: &str) {
        let mut clients = self.clients.write().await;
        if clients.remove(id).is_some() {
            tracing::debug!("Streaming client {} unregistered", id);
        }
    }

    /// Serialize `event` once and write it to every registered client.
    ///
    /// A send failure on one client must not prevent delivery to the others;
    /// failed clients are collected and removed after the loop.
    pub async fn broadcast(&self, event: &ChatEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(json) => sse_data_frame(&json),
            Err(err) => {
                tracing::error!("Failed to serialize event: {}", err);
                return;
            }
        };

        let mut failed = Vec::new();

        {
            let clients = self.clients.read().await;
            for (id, tx) in clients.iter() {
                if tx.send(frame.clone()).is_err() {
                    failed.push(id.clone());
                }
            }
        }

        if !failed.is_empty() {
            let mut clients = self.clients.write().await;
            for id in failed {
                clients.remove(&id);
                tracing::debug!("Removed disconnected client {}", id);
            }
        }
    }

    /// Number of currently-registered clients
    pub async fn client_count(&self) -> usize {
        let clients = self.clients.read().await;
        clients.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a JSON payload as a server-sent-events data frame
pub fn sse_data_frame(json: &str) -> String {
    format!("data: {}\n\n", json)
}
