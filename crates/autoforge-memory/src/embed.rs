//! Text embedding with a deterministic offline fallback.
//!
//! Prefers an OpenAI-compatible embeddings API when configured; otherwise
//! (and on any API failure) falls back to a SHA-256 hash-to-vector encoding
//! so the system keeps working without network access. All vectors are
//! normalized to [`EMBEDDING_DIM`] with deterministic resizing: longer
//! vectors are strided down, shorter ones are tiled.

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Fixed dimensionality of every indexed vector.
pub const EMBEDDING_DIM: usize = 384;

/// Configuration for the external embeddings API.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub model: String,
}

impl EmbedConfig {
    /// Reads `AUTOFORGE_EMBEDDING_*` from the environment; `None` when no
    /// API key is configured.
    pub fn from_env() -> Option<EmbedConfig> {
        let api_key = std::env::var("AUTOFORGE_EMBEDDING_API_KEY").ok()?;
        if api_key.is_empty() {
            return None;
        }
        Some(EmbedConfig {
            api_base_url: std::env::var("AUTOFORGE_EMBEDDING_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key,
            model: std::env::var("AUTOFORGE_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
        })
    }
}

/// Encodes text into fixed-dimension vectors.
pub struct Embedder {
    config: Option<EmbedConfig>,
    client: reqwest::Client,
}

impl Embedder {
    pub fn new(config: Option<EmbedConfig>) -> Self {
        Embedder {
            config,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Hash-only embedder; never touches the network.
    pub fn offline() -> Self {
        Embedder::new(None)
    }

    /// Encodes `text`. Empty input maps to the zero vector; API failures
    /// fall back to the hash encoding.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return vec![0.0; EMBEDDING_DIM];
        }

        let Some(config) = &self.config else {
            return hash_to_vector(text, EMBEDDING_DIM);
        };

        match self.embed_remote(config, text).await {
            Ok(vector) => resize_vector(vector, EMBEDDING_DIM),
            Err(err) => {
                tracing::warn!(%err, "embedding API call failed, using hash-based embedding");
                hash_to_vector(text, EMBEDDING_DIM)
            }
        }
    }

    async fn embed_remote(
        &self,
        config: &EmbedConfig,
        text: &str,
    ) -> Result<Vec<f32>, reqwest::Error> {
        let endpoint = format!("{}/embeddings", config.api_base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .json(&serde_json::json!({
                "model": config.model,
                "input": [text],
            }))
            .send()
            .await?
            .error_for_status()?;

        let parsed: EmbeddingsResponse = response.json().await?;
        Ok(parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Deterministic pseudo-embedding: the SHA-256 digest tiled to `dim` bytes,
/// scaled into [0, 1]. Only approximate clustering, but stable across
/// processes.
pub fn hash_to_vector(text: &str, dim: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = Vec::with_capacity(dim);
    while out.len() < dim {
        for byte in digest.iter() {
            if out.len() == dim {
                break;
            }
            out.push(*byte as f32 / 255.0);
        }
    }
    out
}

/// Deterministically resizes a vector: stride-down when too long, tile-up
/// when too short.
pub fn resize_vector(vec: Vec<f32>, dim: usize) -> Vec<f32> {
    if vec.is_empty() {
        return vec![0.0; dim];
    }
    if vec.len() == dim {
        return vec;
    }
    if vec.len() > dim {
        let stride = vec.len() as f64 / dim as f64;
        return (0..dim).map(|i| vec[(i as f64 * stride) as usize]).collect();
    }
    let mut out = Vec::with_capacity(dim);
    while out.len() < dim {
        let remaining = dim - out.len();
        out.extend(vec.iter().take(remaining).copied());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_vector_is_deterministic_and_sized() {
        let a = hash_to_vector("qa failed: missing import", EMBEDDING_DIM);
        let b = hash_to_vector("qa failed: missing import", EMBEDDING_DIM);
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
        assert!(a.iter().all(|x| (0.0..=1.0).contains(x)));
    }

    #[test]
    fn different_texts_hash_differently() {
        assert_ne!(
            hash_to_vector("alpha", EMBEDDING_DIM),
            hash_to_vector("beta", EMBEDDING_DIM)
        );
    }

    #[test]
    fn resize_strides_down_deterministically() {
        let long: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let out = resize_vector(long.clone(), 5);
        assert_eq!(out, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(out, resize_vector(long, 5));
    }

    #[test]
    fn resize_tiles_up() {
        let short = vec![1.0, 2.0];
        assert_eq!(resize_vector(short, 5), vec![1.0, 2.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn resize_handles_empty_and_exact() {
        assert_eq!(resize_vector(vec![], 3), vec![0.0, 0.0, 0.0]);
        assert_eq!(resize_vector(vec![1.0, 2.0], 2), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn offline_embedder_uses_hash_fallback() {
        let embedder = Embedder::offline();
        let v = embedder.embed("some event text").await;
        assert_eq!(v, hash_to_vector("some event text", EMBEDDING_DIM));
    }

    #[tokio::test]
    async fn empty_text_maps_to_zero_vector() {
        let embedder = Embedder::offline();
        let v = embedder.embed("   ").await;
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(v.len(), EMBEDDING_DIM);
    }
}
