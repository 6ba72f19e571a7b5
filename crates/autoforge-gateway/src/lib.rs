//! The human-in-the-loop gateway.
//!
//! Single entry point for user interfaces: it broadcasts every bus event to
//! connected WebSocket clients, intercepts `security.approved` events into
//! pending human approvals, exposes the approval/rejection endpoints, and
//! proxies plan and read requests to the planner and memory services.

pub mod consumers;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;

pub use error::GatewayError;
pub use router::build_router;
pub use state::{GatewayConfig, GatewayState};
pub use ws::ConnectionManager;

pub const SERVICE_NAME: &str = "gateway_service";
