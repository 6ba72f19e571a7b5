//! WebSocket connection pool and broadcast primitive.
//!
//! Clients never see errors over the socket — a failed send just drops the
//! client from the pool.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Pool of connected WebSocket clients, each behind an unbounded channel.
pub struct ConnectionManager {
    clients: DashMap<u64, mpsc::UnboundedSender<String>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        ConnectionManager {
            clients: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a client; the returned receiver feeds its socket.
    pub fn connect(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(id, tx);
        tracing::info!(active = self.clients.len(), "WebSocket connected");
        (id, rx)
    }

    pub fn disconnect(&self, id: u64) {
        self.clients.remove(&id);
        tracing::info!(active = self.clients.len(), "WebSocket disconnected");
    }

    /// Sends a text message to every connected client, dropping any whose
    /// channel is closed.
    pub fn broadcast(&self, message: &str) {
        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            if entry.value().send(message.to_string()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.disconnect(id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        ConnectionManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_all_clients() {
        let manager = ConnectionManager::new();
        let (_a, mut rx_a) = manager.connect();
        let (_b, mut rx_b) = manager.connect();
        assert_eq!(manager.connection_count(), 2);

        manager.broadcast("hello");
        assert_eq!(rx_a.recv().await.unwrap(), "hello");
        assert_eq!(rx_b.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn dead_clients_are_dropped_on_broadcast() {
        let manager = ConnectionManager::new();
        let (_a, rx_a) = manager.connect();
        let (_b, mut rx_b) = manager.connect();
        drop(rx_a);

        manager.broadcast("ping");
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(rx_b.recv().await.unwrap(), "ping");
    }

    #[tokio::test]
    async fn disconnect_removes_client() {
        let manager = ConnectionManager::new();
        let (id, _rx) = manager.connect();
        manager.disconnect(id);
        assert_eq!(manager.connection_count(), 0);
    }
}
