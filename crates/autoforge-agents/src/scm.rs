//! Source-control executor: materializes human-approved PRs.
//!
//! Actual source-control operations (clone, branch, commit, push, PR
//! creation) live behind the [`SourceControl`] capability; the service here
//! only coordinates: consume `pr.human_approved`, invoke the capability,
//! emit `pr.created`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use autoforge_bus::{EventBus, FnHandler, SubscribeOptions};
use autoforge_events::{
    short_id, Envelope, EventPayload, EventType, PrApproval, PrCreated, PrRequested,
};
use autoforge_memory::MemoryClient;

use crate::context::store_event;
use crate::error::AgentError;

pub const SERVICE_NAME: &str = "github_service";

/// Reference to a created pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct PrRef {
    pub url: String,
    pub number: u64,
}

/// Capability that takes an aggregated file set and returns a pull-request
/// identifier.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn open_pull_request(
        &self,
        request: &PrRequested,
        body: &str,
    ) -> Result<PrRef, AgentError>;
}

/// Deterministic in-tree implementation: no network, sequential PR numbers.
pub struct MockSourceControl {
    counter: AtomicU64,
}

impl MockSourceControl {
    pub fn new() -> Self {
        MockSourceControl {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for MockSourceControl {
    fn default() -> Self {
        MockSourceControl::new()
    }
}

#[async_trait]
impl SourceControl for MockSourceControl {
    async fn open_pull_request(
        &self,
        request: &PrRequested,
        _body: &str,
    ) -> Result<PrRef, AgentError> {
        let number = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let repo = if request.repo_url.is_empty() {
            "local/sandbox"
        } else {
            &request.repo_url
        };
        Ok(PrRef {
            url: format!("https://example.invalid/{repo}/pull/{number}"),
            number,
        })
    }
}

/// The source-control executor service.
pub struct ScmService {
    bus: Arc<EventBus>,
    memory: MemoryClient,
    source_control: Arc<dyn SourceControl>,
}

impl ScmService {
    pub fn new(
        bus: Arc<EventBus>,
        memory: MemoryClient,
        source_control: Arc<dyn SourceControl>,
    ) -> Arc<Self> {
        Arc::new(ScmService {
            bus,
            memory,
            source_control,
        })
    }

    pub fn start(self: &Arc<Self>) -> Result<(), AgentError> {
        let service = Arc::clone(self);
        self.bus.subscribe(
            "github_service.approved_prs",
            &[EventType::PrHumanApproved.as_str()],
            Arc::new(FnHandler(move |event: Envelope| {
                let service = Arc::clone(&service);
                async move {
                    if let EventPayload::PrHumanApproved(approval) = event.decode()? {
                        service.materialize(approval).await?;
                    }
                    Ok(())
                }
            })),
            SubscribeOptions::default(),
        )?;
        tracing::info!("source-control executor ready");
        Ok(())
    }

    async fn materialize(&self, approval: PrApproval) -> Result<(), AgentError> {
        let request: PrRequested = serde_json::from_value(approval.pr_context.clone())
            .map_err(|e| AgentError::Other(format!("pr_context does not decode: {e}")))?;

        let pr = self
            .source_control
            .open_pull_request(&request, &approval.security_reasoning)
            .await?;

        tracing::info!(
            plan_id = short_id(&request.plan_id),
            pr_number = pr.number,
            "pull request created"
        );

        let event = Envelope::new(
            SERVICE_NAME,
            EventPayload::PrCreated(PrCreated {
                plan_id: request.plan_id.clone(),
                pr_url: pr.url,
                pr_number: pr.number,
                branch_name: request.branch_name.clone(),
            }),
        )?;
        self.bus.publish(&event).await?;
        store_event(&self.memory, &event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoforge_events::CodeGenerated;

    fn pr_request() -> PrRequested {
        PrRequested {
            plan_id: "p1".into(),
            repo_url: "git@h:u/r".into(),
            branch_name: "autoforge/plan-p1".into(),
            files: vec![CodeGenerated {
                plan_id: "p1".into(),
                task_id: "t1".into(),
                file_path: "hello.py".into(),
                code: "print('hi')".into(),
                language: "python".into(),
                qa_attempt: 0,
                reasoning: String::new(),
            }],
            commit_message: "feat: hello".into(),
            security_approved: true,
        }
    }

    #[tokio::test]
    async fn mock_source_control_numbers_sequentially() {
        let scm = MockSourceControl::new();
        let first = scm.open_pull_request(&pr_request(), "").await.unwrap();
        let second = scm.open_pull_request(&pr_request(), "").await.unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert!(first.url.contains("/pull/1"));
    }
}
