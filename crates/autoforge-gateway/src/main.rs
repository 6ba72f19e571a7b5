//! Binary entrypoint for the gateway server.
//!
//! Reads configuration from environment variables:
//! - `AUTOFORGE_GATEWAY_PORT`: listen port (default: "8000")
//! - `AUTOFORGE_MEMORY_URL`: memory service base URL
//! - `AUTOFORGE_PLANNER_URL`: planner base URL
//!
//! Note: run standalone this process owns its own in-process broker, so bus
//! consumers only see events published inside it; the `autoforge up`
//! command wires the gateway onto the shared pipeline broker.

use std::sync::Arc;

use autoforge_bus::{Broker, EventBus};
use autoforge_gateway::{build_router, consumers, GatewayConfig, GatewayState};
use autoforge_memory::MemoryClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port = std::env::var("AUTOFORGE_GATEWAY_PORT").unwrap_or_else(|_| "8000".to_string());
    let memory_url = std::env::var("AUTOFORGE_MEMORY_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8001".to_string());

    let bus = Arc::new(EventBus::new(Arc::new(Broker::new())));
    let state = GatewayState::new(bus, MemoryClient::new(memory_url), GatewayConfig::from_env());
    consumers::start(&state).expect("failed to start gateway consumers");

    let app = build_router(state);
    let addr = format!("0.0.0.0:{port}");
    tracing::info!("gateway starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind gateway port");
    axum::serve(listener, app).await.expect("gateway crashed");
}
