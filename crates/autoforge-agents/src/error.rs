//! Shared error type for the agent services.

use thiserror::Error;

/// Errors produced inside agent handlers.
///
/// Handlers surface these to the bus, which drives the retry-then-DLQ path;
/// memory write failures are the exception — they are logged and suppressed
/// at the call site because the bus remains the source of truth.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Bus(#[from] autoforge_bus::BusError),

    #[error(transparent)]
    Memory(#[from] autoforge_memory::ClientError),

    #[error(transparent)]
    Llm(#[from] autoforge_llm::LlmError),

    #[error(transparent)]
    Contract(#[from] autoforge_events::ContractError),

    #[error("source control error: {0}")]
    SourceControl(String),

    #[error("{0}")]
    Other(String),
}
