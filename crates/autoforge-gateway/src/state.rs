//! Shared state for the gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use autoforge_bus::EventBus;
use autoforge_events::PrApproval;
use autoforge_memory::MemoryClient;

use crate::ws::ConnectionManager;

/// Gateway configuration, read from `AUTOFORGE_*` env vars.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub planner_url: String,
    /// TTL for the `/api/plan` idempotency cache.
    pub plan_idem_ttl: Duration,
    /// How many events a fresh WebSocket client receives as history.
    pub history_limit: u32,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        GatewayConfig {
            planner_url: std::env::var("AUTOFORGE_PLANNER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8002".to_string()),
            plan_idem_ttl: Duration::from_secs(
                std::env::var("AUTOFORGE_PLAN_IDEM_TTL_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            history_limit: 20,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            planner_url: "http://127.0.0.1:8002".to_string(),
            plan_idem_ttl: Duration::from_secs(30),
            history_limit: 20,
        }
    }
}

/// Shared application state for the gateway server and its consumers.
#[derive(Clone)]
pub struct GatewayState {
    pub bus: Arc<EventBus>,
    pub memory: MemoryClient,
    pub http: reqwest::Client,
    pub config: GatewayConfig,
    pub ws: Arc<ConnectionManager>,
    /// Pending approvals, transient by design: durable coordination lives
    /// in the event log, this map only holds PRs awaiting a human.
    pub pending: Arc<DashMap<String, PrApproval>>,
    pub plan_cache: Arc<DashMap<String, (Value, Instant)>>,
}

impl GatewayState {
    pub fn new(bus: Arc<EventBus>, memory: MemoryClient, config: GatewayConfig) -> Self {
        GatewayState {
            bus,
            memory,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            config,
            ws: Arc::new(ConnectionManager::new()),
            pending: Arc::new(DashMap::new()),
            plan_cache: Arc::new(DashMap::new()),
        }
    }
}
