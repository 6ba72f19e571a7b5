//! The unified memory facade: structured event log, task state, semantic
//! vector index, and operational cache behind one type.
//!
//! Other services never touch the backends directly; they go through the
//! HTTP surface in [`crate::server`], which delegates here. The SQLite
//! connection sits behind a `Mutex` with short critical sections; embedding
//! (the only async suspension point) happens outside the lock.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use autoforge_events::{short_id, Envelope, EventType};

use crate::cache::CacheStore;
use crate::embed::Embedder;
use crate::error::StorageError;
use crate::rows::{EventRow, ScoredResult, SemanticSearchRequest, TaskRow, TaskUpsert};
use crate::schema;
use crate::vector::{EmbeddingPoint, SearchFilter, VectorIndex};

/// Facade over the three logical stores.
pub struct MemoryStore {
    db: Mutex<Connection>,
    vectors: VectorIndex,
    cache: CacheStore,
    embedder: Embedder,
}

impl MemoryStore {
    /// Opens (or creates) the SQLite database at `path`.
    pub fn new(path: &str, embedder: Embedder) -> Result<Self, StorageError> {
        Ok(MemoryStore {
            db: Mutex::new(schema::open_database(path)?),
            vectors: VectorIndex::new(),
            cache: CacheStore::new(),
            embedder,
        })
    }

    /// Fully in-memory store for tests and the all-in-one process.
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(MemoryStore {
            db: Mutex::new(schema::open_in_memory()?),
            vectors: VectorIndex::new(),
            cache: CacheStore::new(),
            embedder: Embedder::offline(),
        })
    }

    // -------------------------------------------------------------------
    // Event log
    // -------------------------------------------------------------------

    /// Persists an event. Returns `false` when `event_id` already exists.
    ///
    /// On success the event is also indexed into the vector store; an
    /// indexing failure is logged and never fails the event store.
    pub async fn store_event(&self, event: &Envelope) -> Result<bool, StorageError> {
        let plan_id = event
            .decode()
            .ok()
            .and_then(|p| p.plan_id().map(str::to_string))
            .unwrap_or_default();

        {
            let db = self.db.lock().expect("db lock poisoned");
            let exists: bool = db
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM event_log WHERE event_id = ?1)",
                    params![event.event_id],
                    |row| row.get(0),
                )?;
            if exists {
                return Ok(false);
            }
            db.execute(
                "INSERT INTO event_log (event_id, event_type, producer, idempotency_key, payload, plan_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.event_id,
                    event.event_type.as_str(),
                    event.producer,
                    event.idempotency_key,
                    serde_json::to_string(&event.payload)?,
                    plan_id,
                    event.timestamp.to_rfc3339(),
                ],
            )?;
        }

        self.index_event(event, &plan_id).await;
        Ok(true)
    }

    /// Most-recent-first event rows, optionally filtered.
    pub fn get_events(
        &self,
        event_type: Option<&str>,
        plan_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<EventRow>, StorageError> {
        let db = self.db.lock().expect("db lock poisoned");
        let mut sql = String::from(
            "SELECT event_id, event_type, producer, idempotency_key, payload, plan_id, created_at
             FROM event_log WHERE 1=1",
        );
        let mut args: Vec<String> = Vec::new();
        if let Some(event_type) = event_type {
            sql.push_str(&format!(" AND event_type = ?{}", args.len() + 1));
            args.push(event_type.to_string());
        }
        if let Some(plan_id) = plan_id {
            sql.push_str(&format!(" AND plan_id = ?{}", args.len() + 1));
            args.push(plan_id.to_string());
        }
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {limit}"));

        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (event_id, event_type, producer, idempotency_key, payload, plan_id, created_at) =
                row?;
            out.push(EventRow {
                event_id,
                event_type,
                producer,
                idempotency_key,
                payload: serde_json::from_str(&payload)?,
                plan_id,
                created_at,
            });
        }
        Ok(out)
    }

    // -------------------------------------------------------------------
    // Task state
    // -------------------------------------------------------------------

    /// Upserts one task's state.
    ///
    /// Empty incoming strings preserve the stored value; `qa_attempt`
    /// overwrites only when supplied.
    pub fn update_task(&self, upsert: &TaskUpsert) -> Result<(), StorageError> {
        let db = self.db.lock().expect("db lock poisoned");
        let now = Utc::now().to_rfc3339();

        let existing: Option<TaskRow> = db
            .query_row(
                "SELECT task_id, plan_id, status, file_path, code, repo_url, qa_attempt
                 FROM task_state WHERE task_id = ?1",
                params![upsert.task_id],
                |row| {
                    Ok(TaskRow {
                        task_id: row.get(0)?,
                        plan_id: row.get(1)?,
                        status: row.get(2)?,
                        file_path: row.get(3)?,
                        code: row.get(4)?,
                        repo_url: row.get(5)?,
                        qa_attempt: row.get(6)?,
                    })
                },
            )
            .optional()?;

        match existing {
            Some(current) => {
                let file_path = non_empty_or(&upsert.file_path, &current.file_path);
                let code = non_empty_or(&upsert.code, &current.code);
                let repo_url = non_empty_or(&upsert.repo_url, &current.repo_url);
                let qa_attempt = upsert.qa_attempt.unwrap_or(current.qa_attempt);
                db.execute(
                    "UPDATE task_state
                     SET status = ?2, file_path = ?3, code = ?4, repo_url = ?5, qa_attempt = ?6, updated_at = ?7
                     WHERE task_id = ?1",
                    params![
                        upsert.task_id,
                        upsert.status,
                        file_path,
                        code,
                        repo_url,
                        qa_attempt,
                        now,
                    ],
                )?;
            }
            None => {
                db.execute(
                    "INSERT INTO task_state (task_id, plan_id, status, file_path, code, repo_url, qa_attempt, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        upsert.task_id,
                        upsert.plan_id,
                        upsert.status,
                        upsert.file_path,
                        upsert.code,
                        upsert.repo_url,
                        upsert.qa_attempt.unwrap_or(0),
                        now,
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// All task rows of a plan.
    pub fn get_tasks(&self, plan_id: &str) -> Result<Vec<TaskRow>, StorageError> {
        let db = self.db.lock().expect("db lock poisoned");
        let mut stmt = db.prepare(
            "SELECT task_id, plan_id, status, file_path, code, repo_url, qa_attempt
             FROM task_state WHERE plan_id = ?1 ORDER BY task_id",
        )?;
        let rows = stmt.query_map(params![plan_id], |row| {
            Ok(TaskRow {
                task_id: row.get(0)?,
                plan_id: row.get(1)?,
                status: row.get(2)?,
                file_path: row.get(3)?,
                code: row.get(4)?,
                repo_url: row.get(5)?,
                qa_attempt: row.get(6)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // -------------------------------------------------------------------
    // Semantic memory
    // -------------------------------------------------------------------

    /// Encodes the query, filters the index, and returns results ranked by
    /// the blended heuristic.
    pub async fn semantic_search(
        &self,
        request: &SemanticSearchRequest,
    ) -> Vec<ScoredResult> {
        let vector = self.embedder.embed(&request.query).await;
        let filter = SearchFilter {
            plan_id: request.plan_id.clone(),
            event_types: request.event_types.clone(),
        };
        self.vectors
            .search(&vector, &filter, request.limit, Utc::now())
    }

    async fn index_event(&self, event: &Envelope, plan_id: &str) {
        let Some(spec) = index_spec(event) else {
            return;
        };

        let vector = self.embedder.embed(&spec.text).await;
        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::from(spec.text));
        payload.insert(
            "event_type".to_string(),
            Value::from(event.event_type.as_str()),
        );
        payload.insert("producer".to_string(), Value::from(event.producer.clone()));
        payload.insert("plan_id".to_string(), Value::from(plan_id));
        payload.insert(
            "created_at".to_string(),
            Value::from(event.timestamp.to_rfc3339()),
        );
        payload.insert("importance".to_string(), Value::from(spec.importance));
        payload.insert("impact".to_string(), Value::from(spec.impact));
        payload.insert("access_count".to_string(), Value::from(0u64));
        for (key, value) in spec.extra {
            payload.insert(key, value);
        }

        self.vectors.upsert(EmbeddingPoint {
            id: event.event_id.clone(),
            vector,
            payload,
        });
        tracing::debug!(
            event_id = short_id(&event.event_id),
            event_type = event.event_type.as_str(),
            "event indexed for semantic search"
        );
    }

    /// Number of indexed points (for status endpoints and tests).
    pub fn indexed_points(&self) -> usize {
        self.vectors.len()
    }

    // -------------------------------------------------------------------
    // Operational cache
    // -------------------------------------------------------------------

    pub fn cache_set(&self, key: &str, value: &str, ttl: Duration) {
        self.cache.set(key, value, ttl);
    }

    pub fn cache_get(&self, key: &str) -> Option<String> {
        self.cache.get(key)
    }

    /// Atomic set-if-absent; `true` iff the key already existed.
    pub fn idempotency_check(&self, key: &str) -> bool {
        self.cache.idempotency_check(key)
    }
}

fn non_empty_or(incoming: &str, current: &str) -> String {
    if incoming.is_empty() {
        current.to_string()
    } else {
        incoming.to_string()
    }
}

struct IndexSpec {
    text: String,
    importance: f64,
    impact: f64,
    extra: Vec<(String, Value)>,
}

/// Indexing policy: which events enter the vector store, the short text
/// they map to, and their fixed importance/impact.
fn index_spec(event: &Envelope) -> Option<IndexSpec> {
    let payload = &event.payload;
    let text_field = |key: &str| -> String {
        payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string()
    };
    let list_field = |key: &str| -> String {
        payload
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    };

    match event.event_type {
        EventType::PlanCreated => Some(IndexSpec {
            text: format!(
                "PLAN_CREATED\nOriginal prompt: {}\nPlanner reasoning: {}",
                text_field("original_prompt"),
                text_field("reasoning"),
            ),
            importance: 0.9,
            impact: 0.7,
            extra: Vec::new(),
        }),
        EventType::PipelineConclusion => Some(IndexSpec {
            text: format!(
                "PIPELINE_CONCLUSION\nConclusion: {}\nFiles changed: {}",
                text_field("conclusion_text"),
                list_field("files_changed"),
            ),
            importance: 0.95,
            impact: 1.0,
            extra: vec![(
                "approved".to_string(),
                Value::from(payload.get("approved").and_then(Value::as_bool).unwrap_or(true)),
            )],
        }),
        EventType::QaFailed | EventType::SecurityBlocked => {
            let issues = {
                let issues = list_field("issues");
                if issues.is_empty() {
                    list_field("violations")
                } else {
                    issues
                }
            };
            Some(IndexSpec {
                text: format!(
                    "{}\nReasoning: {}\nIssues: {}",
                    event.event_type.as_str(),
                    text_field("reasoning"),
                    issues,
                ),
                importance: 0.8,
                impact: 0.9,
                extra: Vec::new(),
            })
        }
        EventType::QaPassed | EventType::SecurityApproved => Some(IndexSpec {
            text: format!(
                "{}\nReasoning: {}",
                event.event_type.as_str(),
                text_field("reasoning"),
            ),
            importance: 0.7,
            impact: 0.8,
            extra: Vec::new(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoforge_events::{EventPayload, PlanCreated, QaResult, TaskSpec};

    fn plan_created_event(plan_id: &str) -> Envelope {
        Envelope::new(
            "meta_planner",
            EventPayload::PlanCreated(PlanCreated {
                plan_id: plan_id.to_string(),
                original_prompt: "Write hello-world in py".to_string(),
                tasks: vec![TaskSpec::new("hello", "hello.py", "python")],
                reasoning: "single file suffices".to_string(),
            }),
        )
        .unwrap()
    }

    fn qa_failed_event(plan_id: &str, task_id: &str) -> Envelope {
        Envelope::new(
            "qa_service",
            EventPayload::QaFailed(QaResult {
                plan_id: plan_id.to_string(),
                task_id: task_id.to_string(),
                passed: false,
                issues: vec!["missing import".to_string()],
                code: "print(x)".to_string(),
                file_path: "hello.py".to_string(),
                qa_attempt: 2,
                reasoning: "undefined variable".to_string(),
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn store_event_rejects_duplicate_event_id() {
        let store = MemoryStore::in_memory().unwrap();
        let event = plan_created_event("p1");
        assert!(store.store_event(&event).await.unwrap());
        assert!(!store.store_event(&event).await.unwrap());

        let rows = store.get_events(None, None, 10).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn get_events_filters_by_type_and_plan() {
        let store = MemoryStore::in_memory().unwrap();
        store.store_event(&plan_created_event("p1")).await.unwrap();
        store.store_event(&plan_created_event("p2")).await.unwrap();
        store.store_event(&qa_failed_event("p1", "t1")).await.unwrap();

        let by_type = store.get_events(Some("plan.created"), None, 10).unwrap();
        assert_eq!(by_type.len(), 2);

        let by_plan = store.get_events(None, Some("p1"), 10).unwrap();
        assert_eq!(by_plan.len(), 2);

        let both = store
            .get_events(Some("qa.failed"), Some("p1"), 10)
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].plan_id, "p1");
    }

    #[tokio::test]
    async fn get_events_returns_most_recent_first() {
        let store = MemoryStore::in_memory().unwrap();
        store.store_event(&plan_created_event("p1")).await.unwrap();
        store.store_event(&qa_failed_event("p1", "t1")).await.unwrap();

        let rows = store.get_events(None, Some("p1"), 10).unwrap();
        assert_eq!(rows[0].event_type, "qa.failed");
        assert_eq!(rows[1].event_type, "plan.created");
    }

    #[test]
    fn task_upsert_preserves_fields_on_empty_update() {
        let store = MemoryStore::in_memory().unwrap();
        store
            .update_task(&TaskUpsert {
                task_id: "t1".into(),
                plan_id: "p1".into(),
                status: "completed".into(),
                file_path: "hello.py".into(),
                code: "print('hi')".into(),
                repo_url: "git@h:u/r".into(),
                qa_attempt: None,
            })
            .unwrap();

        // Status-only update must not wipe file_path/code/repo_url.
        store
            .update_task(&TaskUpsert::status_only("t1", "p1", "qa_passed"))
            .unwrap();

        let tasks = store.get_tasks("p1").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, "qa_passed");
        assert_eq!(tasks[0].file_path, "hello.py");
        assert_eq!(tasks[0].code, "print('hi')");
        assert_eq!(tasks[0].repo_url, "git@h:u/r");
        assert_eq!(tasks[0].qa_attempt, 0);
    }

    #[test]
    fn task_upsert_overwrites_qa_attempt_when_supplied() {
        let store = MemoryStore::in_memory().unwrap();
        store
            .update_task(&TaskUpsert::status_only("t1", "p1", "in_progress"))
            .unwrap();

        let mut bump = TaskUpsert::status_only("t1", "p1", "qa_retry");
        bump.qa_attempt = Some(2);
        store.update_task(&bump).unwrap();

        let tasks = store.get_tasks("p1").unwrap();
        assert_eq!(tasks[0].qa_attempt, 2);
        assert_eq!(tasks[0].status, "qa_retry");
    }

    #[tokio::test]
    async fn indexing_policy_selects_significant_events() {
        let store = MemoryStore::in_memory().unwrap();
        store.store_event(&plan_created_event("p1")).await.unwrap();
        store.store_event(&qa_failed_event("p1", "t1")).await.unwrap();

        // task.assigned is not part of the indexing policy.
        let task_event = Envelope::new(
            "meta_planner",
            EventPayload::TaskAssigned(autoforge_events::payload::TaskAssigned {
                plan_id: "p1".into(),
                task: TaskSpec::new("x", "x.py", "python"),
                qa_feedback: String::new(),
                plan_reasoning: String::new(),
                repo_url: String::new(),
            }),
        )
        .unwrap();
        store.store_event(&task_event).await.unwrap();

        assert_eq!(store.indexed_points(), 2);
    }

    #[tokio::test]
    async fn semantic_search_is_plan_scoped() {
        let store = MemoryStore::in_memory().unwrap();
        store.store_event(&qa_failed_event("p1", "t1")).await.unwrap();
        store.store_event(&qa_failed_event("p2", "t2")).await.unwrap();

        let results = store
            .semantic_search(&SemanticSearchRequest {
                query: "missing import".to_string(),
                plan_id: Some("p1".to_string()),
                event_types: Some(vec!["qa.failed".to_string()]),
                limit: 5,
            })
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].payload.get("plan_id").and_then(Value::as_str),
            Some("p1")
        );
    }

    #[test]
    fn cache_round_trip_and_idempotency() {
        let store = MemoryStore::in_memory().unwrap();
        store.cache_set("k", "v", Duration::from_secs(30));
        assert_eq!(store.cache_get("k"), Some("v".to_string()));
        assert!(!store.idempotency_check("once"));
        assert!(store.idempotency_check("once"));
    }
}
