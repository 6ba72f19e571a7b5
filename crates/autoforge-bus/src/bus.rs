//! Publish/subscribe surface over the broker with retry and dead-letter
//! semantics.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use autoforge_events::{short_id, Envelope};

use crate::broker::{Broker, Delivery, Headers, DLX_EXCHANGE, EVENTS_EXCHANGE};
use crate::error::BusError;
use crate::idempotency::IdempotencyStore;

/// Default delivery attempts before a message is dead-lettered.
pub const DEFAULT_MSG_MAX_RETRIES: u32 = 3;
/// Default base for the exponential retry backoff.
pub const DEFAULT_RETRY_DELAY_BASE: Duration = Duration::from_secs(1);
/// Hard cap on a single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(32);

/// Error type handlers report; the bus only needs a printable reason.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A subscription callback invoked once per accepted delivery.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Envelope) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: Envelope) -> Result<(), HandlerError> {
        (self.0)(event).await
    }
}

/// Tuning for one subscription.
pub struct SubscribeOptions {
    pub max_retries: u32,
    pub retry_delay_base: Duration,
    pub idempotency: Arc<IdempotencyStore>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions {
            max_retries: DEFAULT_MSG_MAX_RETRIES,
            retry_delay_base: DEFAULT_RETRY_DELAY_BASE,
            idempotency: Arc::new(IdempotencyStore::new()),
        }
    }
}

impl SubscribeOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_base(mut self, base: Duration) -> Self {
        self.retry_delay_base = base;
        self
    }

    pub fn with_idempotency(mut self, store: Arc<IdempotencyStore>) -> Self {
        self.idempotency = store;
        self
    }
}

/// Publish/subscribe client over a shared [`Broker`].
///
/// Every service holds one `EventBus`. Subscriptions spawn one long-lived
/// consumer task each; the task is aborted on [`EventBus::shutdown`].
pub struct EventBus {
    broker: Arc<Broker>,
    subscriptions: DashMap<String, JoinHandle<()>>,
}

impl EventBus {
    pub fn new(broker: Arc<Broker>) -> Self {
        EventBus {
            broker,
            subscriptions: DashMap::new(),
        }
    }

    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(&self.broker)
    }

    /// Publishes an envelope on the main exchange with routing key =
    /// event type and a zeroed retry header.
    pub async fn publish(&self, event: &Envelope) -> Result<(), BusError> {
        let delivery = Delivery {
            body: event.to_bytes()?,
            routing_key: event.event_type.as_str().to_string(),
            headers: Headers {
                idempotency_key: event.idempotency_key.clone(),
                retry_count: 0,
                final_failure: false,
            },
        };
        self.broker.publish(EVENTS_EXCHANGE, delivery).await?;
        tracing::debug!(
            routing_key = event.event_type.as_str(),
            event_id = short_id(&event.event_id),
            "published"
        );
        Ok(())
    }

    /// Declares `queue` (bound to each routing key on the main exchange) and
    /// its paired `dlq.<queue>` (bound to the same keys on the dead-letter
    /// exchange), then starts consuming.
    ///
    /// Delivery algorithm, per message:
    /// 1. Duplicate suppression through the idempotency store, using a
    ///    retry-scoped key so republished retries are not dropped while
    ///    original-delivery duplicates still are.
    /// 2. Handler failures (including panics and malformed bodies) are
    ///    retried `max_retries - 1` times by republishing the same body with
    ///    `x-retry-count + 1` after `min(base × 2^retry, 32s)`.
    /// 3. Exhausted messages are republished on the dead-letter exchange
    ///    with the `x-final-failure` header.
    pub fn subscribe(
        &self,
        queue_name: &str,
        routing_keys: &[&str],
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> Result<(), BusError> {
        if self.subscriptions.contains_key(queue_name) {
            return Err(BusError::AlreadySubscribed(queue_name.to_string()));
        }

        let dlq_name = format!("dlq.{queue_name}");
        self.broker.declare_queue(&dlq_name);
        for key in routing_keys {
            self.broker.bind(DLX_EXCHANGE, key, &dlq_name)?;
        }

        self.broker.declare_queue(queue_name);
        for key in routing_keys {
            self.broker.bind(EVENTS_EXCHANGE, key, queue_name)?;
            tracing::info!(queue = queue_name, routing_key = key, "queue bound");
        }

        let consumer = self.broker.consumer(queue_name)?;
        let broker = Arc::clone(&self.broker);
        let queue = queue_name.to_string();
        let task = tokio::spawn(async move {
            consume_loop(broker, consumer, queue, handler, options).await;
        });
        self.subscriptions.insert(queue_name.to_string(), task);
        Ok(())
    }

    /// Aborts all consumer tasks.
    pub fn shutdown(&self) {
        for entry in self.subscriptions.iter() {
            entry.value().abort();
        }
        self.subscriptions.clear();
    }
}

async fn consume_loop(
    broker: Arc<Broker>,
    consumer: crate::broker::Consumer,
    queue: String,
    handler: Arc<dyn EventHandler>,
    options: SubscribeOptions,
) {
    let dlq_name = format!("dlq.{queue}");
    tracing::info!(
        queue = %queue,
        max_retries = options.max_retries,
        dlq = %dlq_name,
        "consuming"
    );

    while let Some(delivery) = consumer.recv().await {
        let retry_count = delivery.headers.retry_count;

        let failure = match Envelope::from_bytes(&delivery.body) {
            Ok(envelope) => {
                let effective_key = if retry_count == 0 {
                    envelope.idempotency_key.clone()
                } else {
                    format!("{}:retry:{}", envelope.idempotency_key, retry_count)
                };

                if options.idempotency.is_seen(&effective_key) {
                    tracing::info!(
                        queue = %queue,
                        event_id = short_id(&envelope.event_id),
                        "skipping duplicate event"
                    );
                    continue;
                }
                options.idempotency.mark_seen(&effective_key);

                // Run the handler in its own task so a panic is contained
                // and counted as a handler failure.
                let task_handler = Arc::clone(&handler);
                let result =
                    tokio::spawn(async move { task_handler.handle(envelope).await }).await;
                match result {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(err.to_string()),
                    Err(join_err) => Some(format!("handler panicked: {join_err}")),
                }
            }
            Err(err) => Some(format!("malformed message: {err}")),
        };

        let Some(reason) = failure else {
            continue;
        };

        tracing::warn!(
            queue = %queue,
            attempt = retry_count + 1,
            max = options.max_retries,
            %reason,
            "handler failed"
        );

        if retry_count + 1 < options.max_retries {
            let delay = retry_delay(options.retry_delay_base, retry_count);
            tracing::info!(queue = %queue, ?delay, "retrying message");
            tokio::time::sleep(delay).await;

            let mut retry = delivery.clone();
            retry.headers.retry_count = retry_count + 1;
            // Republish from a detached task; the consumer must not await
            // its own (possibly full) queue.
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                if let Err(err) = broker.publish(EVENTS_EXCHANGE, retry).await {
                    tracing::error!(%err, "failed to republish retry");
                }
            });
        } else {
            tracing::error!(
                queue = %queue,
                retries = options.max_retries,
                dlq = %dlq_name,
                "retries exhausted, dead-lettering"
            );
            let mut dead = delivery.clone();
            dead.headers.final_failure = true;
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                if let Err(err) = broker.publish(DLX_EXCHANGE, dead).await {
                    tracing::error!(%err, "failed to dead-letter message");
                }
            });
        }
    }
}

/// Delay before retry attempt `retry_count`: `min(base × 2^n, 32s)`.
pub fn retry_delay(base: Duration, retry_count: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry_count);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}
