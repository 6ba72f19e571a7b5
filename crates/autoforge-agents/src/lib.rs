//! The pipeline's agent services.
//!
//! Each service owns its bus subscriptions, memory client, LLM provider,
//! and in-process caches:
//!
//! - [`planner`] decomposes user requests into tasks and consumes plan
//!   revisions.
//! - [`developer`] implements one task at a time, emitting code plus
//!   reasoning.
//! - [`qa`] gates each task with a deterministic pass and an LLM review,
//!   drives the per-task retry loop, and aggregates finished plans into a
//!   single PR request.
//! - [`security`] scans the aggregated file set with a fixed rule catalogue
//!   and composes the final pipeline conclusion.
//! - [`replanner`] criticises failed outcomes and suggests structural plan
//!   revisions.
//! - [`scm`] materializes human-approved PRs through the [`scm::SourceControl`]
//!   capability.

pub mod context;
pub mod developer;
pub mod error;
pub mod planner;
pub mod qa;
pub mod replanner;
pub mod scm;
pub mod security;

pub use error::AgentError;
