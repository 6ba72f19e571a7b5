//! Deterministic providers for development and tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::LlmError;
use crate::provider::{LlmProvider, LlmRequest, LlmResponse};

const MOCK_PREFIX: &str = "[MOCK] ";

/// Always returns the same output for the same prompt hash, making the
/// entire pipeline reproducible without network calls.
pub struct MockProvider {
    call_count: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        MockProvider {
            call_count: AtomicU64::new(0),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        MockProvider::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let prompt_hash = format!("{:x}", Sha256::digest(request.prompt.as_bytes()));
        let content = format!(
            "{MOCK_PREFIX}Deterministic response for prompt hash {}. Call #{call}.",
            &prompt_hash[..12]
        );

        let prompt_tokens = request.prompt.split_whitespace().count() as u64;
        let completion_tokens = content.split_whitespace().count() as u64;
        Ok(LlmResponse {
            content,
            model: "mock-deterministic".to_string(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cached: false,
        })
    }
}

/// Pops canned responses in order; used by tests to force specific verdicts
/// (a failing QA review, a replanner decision, a planner task list).
///
/// When the queue runs dry the provider repeats its last response, so a
/// retry loop can keep "passing" after the scripted failures are consumed.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    calls: AtomicU64,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedProvider {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            calls: AtomicU64::new(0),
        }
    }

    /// How many times `generate` ran.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut queue = self.responses.lock().expect("scripted queue poisoned");
            queue.pop_front()
        };
        let content = match next {
            Some(content) => {
                *self.last.lock().expect("scripted last poisoned") = Some(content.clone());
                content
            }
            None => self
                .last
                .lock()
                .expect("scripted last poisoned")
                .clone()
                .ok_or_else(|| {
                    LlmError::MalformedResponse("scripted provider has no responses".to_string())
                })?,
        };

        let prompt_tokens = request.prompt.split_whitespace().count() as u64;
        let completion_tokens = content.split_whitespace().count() as u64;
        Ok(LlmResponse {
            content,
            model: "scripted".to_string(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cached: false,
        })
    }
}
