//! Topic-routed event bus with bounded retries and dead-letter routing.
//!
//! The broker is an in-process topic fabric: two topic exchanges (`events`
//! and `dlx`), named queues backed by bounded channels, and one long-lived
//! consumer task per subscription. Delivery is at-least-once; consumers are
//! deduplicated through an [`IdempotencyStore`], failed handlers are retried
//! with exponential backoff by republishing the same body with an
//! incremented retry header, and messages that exhaust their retries land on
//! the paired `dlq.<queue>` queue for manual inspection.

pub mod broker;
pub mod bus;
pub mod error;
pub mod idempotency;
pub mod topic;

pub use broker::{Broker, Consumer, Delivery, Headers, DLX_EXCHANGE, EVENTS_EXCHANGE};
pub use bus::{EventBus, EventHandler, FnHandler, HandlerError, SubscribeOptions};
pub use error::BusError;
pub use idempotency::IdempotencyStore;
pub use topic::topic_matches;
