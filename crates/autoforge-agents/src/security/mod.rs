//! The security gate: last stop before a PR reaches a human.

pub mod scanner;

use std::sync::Arc;

use autoforge_bus::{EventBus, FnHandler, SubscribeOptions};
use autoforge_events::{
    short_id, Envelope, EventPayload, EventType, PrRequested, SecurityResult,
};
use autoforge_memory::MemoryClient;

use crate::context::store_event;
use crate::error::AgentError;
use self::scanner::scan_files;

pub const SERVICE_NAME: &str = "security_service";

/// The security service.
///
/// Consumes `pr.requested`, scans the aggregated file set, and emits either
/// `security.approved` (carrying the original PR payload as `pr_context`)
/// or `security.blocked`. Deliberately LLM-free.
pub struct SecurityService {
    bus: Arc<EventBus>,
    memory: MemoryClient,
}

impl SecurityService {
    pub fn new(bus: Arc<EventBus>, memory: MemoryClient) -> Arc<Self> {
        Arc::new(SecurityService { bus, memory })
    }

    pub fn start(self: &Arc<Self>) -> Result<(), AgentError> {
        let service = Arc::clone(self);
        self.bus.subscribe(
            "security_service.pr_requests",
            &[EventType::PrRequested.as_str()],
            Arc::new(FnHandler(move |event: Envelope| {
                let service = Arc::clone(&service);
                async move {
                    if let EventPayload::PrRequested(pr) = event.decode()? {
                        service.scan(pr).await?;
                    }
                    Ok(())
                }
            })),
            SubscribeOptions::default(),
        )?;
        tracing::info!("security ready");
        Ok(())
    }

    async fn scan(&self, pr: PrRequested) -> Result<(), AgentError> {
        tracing::info!(
            plan_id = short_id(&pr.plan_id),
            files = pr.files.len(),
            "security scan"
        );

        let result = scan_files(&pr.files);

        let pr_context = if result.approved {
            serde_json::to_value(&pr).map_err(autoforge_events::ContractError::from)?
        } else {
            serde_json::Value::Object(serde_json::Map::new())
        };

        let payload = SecurityResult {
            plan_id: pr.plan_id.clone(),
            branch_name: pr.branch_name.clone(),
            approved: result.approved,
            violations: result.violations.clone(),
            files_scanned: result.files_scanned,
            pr_context,
            reasoning: result.reasoning,
        };

        let event = if result.approved {
            tracing::info!(plan_id = short_id(&pr.plan_id), "security APPROVED");
            Envelope::new(SERVICE_NAME, EventPayload::SecurityApproved(payload))?
        } else {
            tracing::error!(
                plan_id = short_id(&pr.plan_id),
                violations = ?result.violations,
                "security BLOCKED"
            );
            Envelope::new(SERVICE_NAME, EventPayload::SecurityBlocked(payload))?
        };

        self.bus.publish(&event).await?;
        store_event(&self.memory, &event).await;
        Ok(())
    }
}
