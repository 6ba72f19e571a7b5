//! Text-completion adapter for the pipeline's agents.
//!
//! Everything LLM-shaped goes through the [`LlmProvider`] trait, which
//! returns content plus token counts. The [`MockProvider`] is fully
//! deterministic so the whole pipeline runs reproducibly without network
//! access; [`OpenAiProvider`] talks to any OpenAI-compatible chat API; and
//! [`CachedProvider`] wraps either with a prompt-hash cache.

pub mod cache;
pub mod error;
pub mod mock;
pub mod openai;
pub mod provider;

pub use cache::CachedProvider;
pub use error::LlmError;
pub use mock::{MockProvider, ScriptedProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::{provider_from_env, LlmProvider, LlmRequest, LlmResponse};
