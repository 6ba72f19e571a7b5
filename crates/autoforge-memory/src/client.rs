//! HTTP client for the memory facade, used by every other service.
//!
//! Write failures surface as `Err` so callers can log and suppress them:
//! the bus stays the source of truth for coordination, and a missed memory
//! write must never fail a handler.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use autoforge_events::Envelope;

use crate::rows::{EventRow, ScoredResult, SemanticSearchRequest, TaskRow, TaskUpsert};

/// Errors from memory HTTP calls.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("memory request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("memory returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Typed client over the memory HTTP surface.
#[derive(Clone)]
pub struct MemoryClient {
    base_url: String,
    client: reqwest::Client,
}

impl MemoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        MemoryClient {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// `POST /events`; returns whether the row was new.
    pub async fn store_event(&self, event: &Envelope) -> Result<bool, ClientError> {
        let response = self
            .client
            .post(self.url("/events"))
            .json(event)
            .send()
            .await?;
        let body: Value = Self::check(response).await?.json().await?;
        Ok(body.get("stored").and_then(Value::as_bool).unwrap_or(false))
    }

    /// `GET /events` with optional filters.
    pub async fn get_events(
        &self,
        event_type: Option<&str>,
        plan_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<EventRow>, ClientError> {
        let mut request = self
            .client
            .get(self.url("/events"))
            .query(&[("limit", limit.to_string())]);
        if let Some(event_type) = event_type {
            request = request.query(&[("event_type", event_type)]);
        }
        if let Some(plan_id) = plan_id {
            request = request.query(&[("plan_id", plan_id)]);
        }
        let response = request.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `POST /tasks`.
    pub async fn update_task(&self, upsert: &TaskUpsert) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/tasks"))
            .json(upsert)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// `GET /tasks/{plan_id}`.
    pub async fn get_tasks(&self, plan_id: &str) -> Result<Vec<TaskRow>, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/tasks/{plan_id}")))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// `POST /semantic/search`.
    pub async fn semantic_search(
        &self,
        request: &SemanticSearchRequest,
    ) -> Result<Vec<ScoredResult>, ClientError> {
        let response = self
            .client
            .post(self.url("/semantic/search"))
            .json(request)
            .send()
            .await?;
        let body: Value = Self::check(response).await?.json().await?;
        let results = body.get("results").cloned().unwrap_or(Value::Array(vec![]));
        Ok(serde_json::from_value(results).unwrap_or_default())
    }
}
