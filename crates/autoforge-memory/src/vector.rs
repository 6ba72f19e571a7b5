//! In-process vector index with heuristic retrieval scoring.
//!
//! One point per indexed event. Retrieval filters first (plan, event
//! types), ranks the survivors by cosine similarity, keeps the top `limit`,
//! then re-ranks those by the blended heuristic:
//!
//! ```text
//! heuristic = s × (1 + 0.4·importance + 0.3·impact)
//!           + 0.2 × 1/(1 + age_hours)
//!           + 0.1 × min(1, ln(1 + access_count)/3)
//! ```
//!
//! Served hits get their `access_count` bumped so frequently retrieved
//! memories slowly gain weight.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::rows::ScoredResult;

/// One indexed event.
#[derive(Debug, Clone)]
pub struct EmbeddingPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// Filters applied before any scoring.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub plan_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl SearchFilter {
    fn matches(&self, payload: &Map<String, Value>) -> bool {
        if let Some(plan_id) = &self.plan_id {
            if payload.get("plan_id").and_then(Value::as_str) != Some(plan_id.as_str()) {
                return false;
            }
        }
        if let Some(event_types) = &self.event_types {
            if !event_types.is_empty() {
                let event_type = payload
                    .get("event_type")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if !event_types.iter().any(|t| t == event_type) {
                    return false;
                }
            }
        }
        true
    }
}

/// The in-memory point collection.
pub struct VectorIndex {
    points: RwLock<Vec<EmbeddingPoint>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        VectorIndex {
            points: RwLock::new(Vec::new()),
        }
    }

    /// Inserts or replaces a point by id.
    pub fn upsert(&self, point: EmbeddingPoint) {
        let mut points = self.points.write().expect("vector index lock poisoned");
        if let Some(existing) = points.iter_mut().find(|p| p.id == point.id) {
            *existing = point;
        } else {
            points.push(point);
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().expect("vector index lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Filter → similarity top-`limit` → heuristic re-rank (stable,
    /// descending) → bump `access_count` on the served hits.
    pub fn search(
        &self,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<ScoredResult> {
        let mut candidates: Vec<(String, f32)> = {
            let points = self.points.read().expect("vector index lock poisoned");
            points
                .iter()
                .filter(|p| filter.matches(&p.payload))
                .map(|p| (p.id.clone(), cosine_similarity(query, &p.vector)))
                .collect()
        };
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(limit);

        let mut results: Vec<ScoredResult> = Vec::with_capacity(candidates.len());
        {
            let mut points = self.points.write().expect("vector index lock poisoned");
            for (id, score) in candidates {
                let Some(point) = points.iter_mut().find(|p| p.id == id) else {
                    continue;
                };
                let heuristic = heuristic_score(score, &point.payload, now);
                results.push(ScoredResult {
                    id: point.id.clone(),
                    score,
                    heuristic_score: heuristic,
                    payload: Value::Object(point.payload.clone()),
                });
                let access_count = point
                    .payload
                    .get("access_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                point
                    .payload
                    .insert("access_count".to_string(), Value::from(access_count + 1));
            }
        }

        results.sort_by(|a, b| {
            b.heuristic_score
                .partial_cmp(&a.heuristic_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        VectorIndex::new()
    }
}

/// Cosine similarity; zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Blends vector similarity with importance, impact, recency, and retrieval
/// frequency.
pub fn heuristic_score(base_score: f32, payload: &Map<String, Value>, now: DateTime<Utc>) -> f32 {
    let importance = payload
        .get("importance")
        .and_then(Value::as_f64)
        .unwrap_or(0.5) as f32;
    let impact = payload.get("impact").and_then(Value::as_f64).unwrap_or(0.0) as f32;
    let access_count = payload
        .get("access_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let reference = payload
        .get("last_used_at")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| payload.get("created_at").and_then(Value::as_str));

    let recency_boost = reference
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .map(|t| {
            let age_seconds = (now - t).num_seconds().max(0) as f32;
            1.0 / (1.0 + age_seconds / 3600.0)
        })
        .unwrap_or(0.0);

    let freq_boost = ((1.0 + access_count as f32).ln() / 3.0).min(1.0);

    base_score * (1.0 + 0.4 * importance + 0.3 * impact) + 0.2 * recency_boost + 0.1 * freq_boost
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn point(id: &str, vector: Vec<f32>, payload: Map<String, Value>) -> EmbeddingPoint {
        EmbeddingPoint {
            id: id.to_string(),
            vector,
            payload,
        }
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn heuristic_weighs_importance_and_impact() {
        let now = Utc::now();
        let plain = payload(&[("importance", json!(0.0)), ("impact", json!(0.0))]);
        let weighty = payload(&[("importance", json!(1.0)), ("impact", json!(1.0))]);
        let a = heuristic_score(0.5, &plain, now);
        let b = heuristic_score(0.5, &weighty, now);
        assert!(b > a);
        assert!((b - 0.5 * 1.7).abs() < 1e-5);
    }

    #[test]
    fn heuristic_recency_boost_decays() {
        let now = Utc::now();
        let fresh = payload(&[("created_at", json!(now.to_rfc3339()))]);
        let stale = payload(&[(
            "created_at",
            json!((now - chrono::Duration::hours(10)).to_rfc3339()),
        )]);
        assert!(heuristic_score(0.0, &fresh, now) > heuristic_score(0.0, &stale, now));
    }

    #[test]
    fn heuristic_frequency_boost_caps_at_a_tenth() {
        let now = Utc::now();
        let hot = payload(&[("access_count", json!(10_000))]);
        let score = heuristic_score(0.0, &hot, now);
        assert!(score <= 0.1 + 1e-6);
    }

    #[test]
    fn filters_are_applied_before_scoring() {
        let index = VectorIndex::new();
        index.upsert(point(
            "a",
            vec![1.0, 0.0],
            payload(&[("plan_id", json!("p1")), ("event_type", json!("qa.failed"))]),
        ));
        index.upsert(point(
            "b",
            vec![1.0, 0.0],
            payload(&[("plan_id", json!("p2")), ("event_type", json!("qa.failed"))]),
        ));

        let filter = SearchFilter {
            plan_id: Some("p1".to_string()),
            event_types: None,
        };
        let results = index.search(&[1.0, 0.0], &filter, 10, Utc::now());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn results_sort_by_descending_heuristic() {
        let index = VectorIndex::new();
        // Same similarity, different importance: the weightier point wins.
        index.upsert(point(
            "low",
            vec![1.0, 0.0],
            payload(&[("importance", json!(0.1)), ("impact", json!(0.0))]),
        ));
        index.upsert(point(
            "high",
            vec![1.0, 0.0],
            payload(&[("importance", json!(0.9)), ("impact", json!(1.0))]),
        ));

        let results = index.search(&[1.0, 0.0], &SearchFilter::default(), 10, Utc::now());
        assert_eq!(results[0].id, "high");
        assert!(results[0].heuristic_score >= results[1].heuristic_score);
    }

    #[test]
    fn served_hits_gain_access_count() {
        let index = VectorIndex::new();
        index.upsert(point("a", vec![1.0], payload(&[])));

        index.search(&[1.0], &SearchFilter::default(), 10, Utc::now());
        let results = index.search(&[1.0], &SearchFilter::default(), 10, Utc::now());
        assert_eq!(
            results[0].payload.get("access_count").and_then(Value::as_u64),
            Some(1)
        );
    }

    #[test]
    fn upsert_replaces_by_id() {
        let index = VectorIndex::new();
        index.upsert(point("a", vec![1.0], payload(&[("v", json!(1))])));
        index.upsert(point("a", vec![0.5], payload(&[("v", json!(2))])));
        assert_eq!(index.len(), 1);
    }
}
