//! The provider contract and its data models.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// One completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub model: String,
}

impl LlmRequest {
    /// Plain-text request with the deterministic defaults every agent uses:
    /// temperature 0 so reruns reproduce.
    pub fn text(prompt: impl Into<String>) -> Self {
        LlmRequest {
            prompt: prompt.into(),
            temperature: 0.0,
            max_tokens: 4096,
            model: String::new(),
        }
    }
}

/// One completion response, including token accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cached: bool,
}

/// Contract for text-completion providers.
///
/// Implementations must return a fully populated [`LlmResponse`] including
/// token counts, and must honour temperature 0 for determinism.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Convenience wrapper for a plain string prompt.
    async fn generate_text(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        self.generate(&LlmRequest::text(prompt)).await
    }
}

/// Builds the provider selected by `AUTOFORGE_LLM_PROVIDER` (`mock` by
/// default, `openai` for any OpenAI-compatible endpoint), wrapped in the
/// prompt-hash cache.
pub fn provider_from_env() -> Result<Arc<dyn LlmProvider>, LlmError> {
    let name = std::env::var("AUTOFORGE_LLM_PROVIDER").unwrap_or_else(|_| "mock".to_string());
    let inner: Arc<dyn LlmProvider> = match name.as_str() {
        "mock" => Arc::new(crate::mock::MockProvider::new()),
        "openai" => Arc::new(crate::openai::OpenAiProvider::from_env()?),
        other => {
            return Err(LlmError::Config(format!(
                "unknown LLM provider '{other}': use mock or openai"
            )))
        }
    };
    tracing::info!(provider = %name, "LLM provider initialized");
    Ok(Arc::new(crate::cache::CachedProvider::new(inner)))
}
