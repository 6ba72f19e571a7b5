//! The in-process topic broker: exchanges, bindings, and queues.
//!
//! Queues are bounded channels so a slow consumer exerts backpressure on
//! publishers. Each queue's receiver sits behind an async mutex released
//! between messages, which lets replica consumers compete on one queue while
//! each handles at most one message at a time (the prefetch-1 analogue).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use crate::error::BusError;
use crate::topic::topic_matches;

/// Main topic exchange every service publishes to.
pub const EVENTS_EXCHANGE: &str = "events";
/// Dead-letter topic exchange; queues named `dlq.<queue>` bind here.
pub const DLX_EXCHANGE: &str = "dlx";

/// Per-queue channel capacity. Full queues make `publish` wait.
const QUEUE_CAPACITY: usize = 256;

/// Message headers carried alongside the body.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    pub idempotency_key: String,
    pub retry_count: u32,
    pub final_failure: bool,
}

/// One message as enqueued on a queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub routing_key: String,
    pub headers: Headers,
}

#[derive(Debug)]
struct Binding {
    pattern: String,
    queue: String,
}

#[derive(Clone)]
struct QueueHandle {
    tx: mpsc::Sender<Delivery>,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
}

/// In-process topic broker with the two pipeline exchanges pre-declared.
pub struct Broker {
    exchanges: DashMap<String, Vec<Binding>>,
    queues: DashMap<String, QueueHandle>,
}

impl Broker {
    pub fn new() -> Self {
        let exchanges = DashMap::new();
        exchanges.insert(EVENTS_EXCHANGE.to_string(), Vec::new());
        exchanges.insert(DLX_EXCHANGE.to_string(), Vec::new());
        Broker {
            exchanges,
            queues: DashMap::new(),
        }
    }

    /// Declares a queue; idempotent.
    pub fn declare_queue(&self, name: &str) {
        self.queues.entry(name.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
            QueueHandle {
                tx,
                rx: Arc::new(Mutex::new(rx)),
            }
        });
    }

    /// Binds a queue to an exchange under a topic pattern; idempotent.
    pub fn bind(&self, exchange: &str, pattern: &str, queue: &str) -> Result<(), BusError> {
        if !self.queues.contains_key(queue) {
            return Err(BusError::UnknownQueue(queue.to_string()));
        }
        let mut bindings = self
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BusError::UnknownExchange(exchange.to_string()))?;
        let exists = bindings
            .iter()
            .any(|b| b.pattern == pattern && b.queue == queue);
        if !exists {
            bindings.push(Binding {
                pattern: pattern.to_string(),
                queue: queue.to_string(),
            });
            tracing::debug!(exchange, pattern, queue, "queue bound");
        }
        Ok(())
    }

    /// Routes a delivery to every queue whose binding matches the routing
    /// key. Waits when a destination queue is full.
    pub async fn publish(&self, exchange: &str, delivery: Delivery) -> Result<(), BusError> {
        let targets: Vec<String> = {
            let bindings = self
                .exchanges
                .get(exchange)
                .ok_or_else(|| BusError::UnknownExchange(exchange.to_string()))?;
            let mut queues: Vec<String> = bindings
                .iter()
                .filter(|b| topic_matches(&b.pattern, &delivery.routing_key))
                .map(|b| b.queue.clone())
                .collect();
            queues.dedup();
            queues
        };

        for queue in targets {
            let tx = match self.queues.get(&queue) {
                Some(handle) => handle.tx.clone(),
                None => continue,
            };
            tx.send(delivery.clone())
                .await
                .map_err(|_| BusError::QueueClosed(queue.clone()))?;
        }
        Ok(())
    }

    /// Opens a consumer on a declared queue.
    pub fn consumer(&self, queue: &str) -> Result<Consumer, BusError> {
        let handle = self
            .queues
            .get(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;
        Ok(Consumer {
            queue: queue.to_string(),
            rx: handle.rx.clone(),
        })
    }
}

impl Default for Broker {
    fn default() -> Self {
        Broker::new()
    }
}

/// A competing consumer on one queue.
pub struct Consumer {
    queue: String,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
}

impl Consumer {
    /// Waits for the next delivery. The receiver lock is released between
    /// messages so replica consumers interleave.
    pub async fn recv(&self) -> Option<Delivery> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Non-blocking poll, used by tests to inspect dead-letter queues.
    pub fn try_recv(&self) -> Option<Delivery> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }
}
