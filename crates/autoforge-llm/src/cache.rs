//! Prompt-hash response cache.
//!
//! Wraps any provider; identical requests return the cached response
//! without calling the backend, guaranteeing determinism and saving tokens.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::LlmError;
use crate::provider::{LlmProvider, LlmRequest, LlmResponse};

/// Decorator that adds caching around any [`LlmProvider`].
pub struct CachedProvider {
    inner: Arc<dyn LlmProvider>,
    cache: Mutex<HashMap<String, LlmResponse>>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn LlmProvider>) -> Self {
        CachedProvider {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(request: &LlmRequest) -> String {
        let raw = format!(
            "{}|{}|{}",
            request.prompt, request.model, request.max_tokens
        );
        format!("llm_cache:{:x}", Sha256::digest(raw.as_bytes()))
    }
}

#[async_trait]
impl LlmProvider for CachedProvider {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let key = Self::cache_key(request);

        if let Some(hit) = self.cache.lock().expect("llm cache poisoned").get(&key) {
            tracing::debug!(key = %&key[..24], "LLM cache hit");
            let mut response = hit.clone();
            response.cached = true;
            return Ok(response);
        }

        let response = self.inner.generate(request).await?;
        self.cache
            .lock()
            .expect("llm cache poisoned")
            .insert(key, response.clone());
        Ok(response)
    }
}
