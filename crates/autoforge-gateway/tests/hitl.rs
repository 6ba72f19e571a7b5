//! HITL gateway tests: approval interception, human decisions, plan proxy
//! idempotency, and metrics aggregation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use autoforge_bus::{Broker, EventBus};
use autoforge_events::{
    CodeGenerated, Envelope, EventPayload, PrRequested, SecurityResult, TokensUsed,
};
use autoforge_gateway::{build_router, consumers, GatewayConfig, GatewayState};
use autoforge_memory::server::{build_router as memory_router, AppState};
use autoforge_memory::{EventRow, MemoryClient};

async fn start_memory() -> MemoryClient {
    let app = memory_router(AppState::in_memory().unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MemoryClient::new(format!("http://{addr}"))
}

async fn gateway_state() -> (GatewayState, MemoryClient) {
    let memory = start_memory().await;
    let bus = Arc::new(EventBus::new(Arc::new(Broker::new())));
    let state = GatewayState::new(bus, memory.clone(), GatewayConfig::default());
    consumers::start(&state).unwrap();
    (state, memory)
}

fn approved_security_event() -> Envelope {
    let pr = PrRequested {
        plan_id: "plan-1".into(),
        repo_url: "git@h:u/r".into(),
        branch_name: "autoforge/plan-plan-1".into(),
        files: vec![CodeGenerated {
            plan_id: "plan-1".into(),
            task_id: "t1".into(),
            file_path: "hello.js".into(),
            code: "console.log('hi')".into(),
            language: "javascript".into(),
            qa_attempt: 0,
            reasoning: "[Developer] simple\n[QA Reviewer] fine".into(),
        }],
        commit_message: "feat: hello".into(),
        security_approved: false,
    };
    Envelope::new(
        "security_service",
        EventPayload::SecurityApproved(SecurityResult {
            plan_id: "plan-1".into(),
            branch_name: pr.branch_name.clone(),
            approved: true,
            violations: vec![],
            files_scanned: 1,
            pr_context: serde_json::to_value(&pr).unwrap(),
            reasoning: "all clean".into(),
        }),
    )
    .unwrap()
}

/// Polls a synchronous condition for up to ~5s.
async fn wait_until<F: FnMut() -> bool>(what: &str, mut ready: F) {
    for _ in 0..200 {
        if ready() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Polls memory until at least one row of `event_type` exists for the plan.
async fn wait_for_rows(memory: &MemoryClient, event_type: &str, plan_id: &str) -> Vec<EventRow> {
    for _ in 0..200 {
        if let Ok(rows) = memory.get_events(Some(event_type), Some(plan_id), 10).await {
            if !rows.is_empty() {
                return rows;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {event_type} rows");
}

async fn request(
    app: &Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(json!(null)))
}

#[tokio::test]
async fn security_approval_becomes_pending_with_conclusion() {
    let (state, memory) = gateway_state().await;

    state.bus.publish(&approved_security_event()).await.unwrap();
    wait_until("pending approval", || state.pending.len() == 1).await;

    let approval = state.pending.iter().next().unwrap().value().clone();
    assert_eq!(approval.plan_id, "plan-1");
    assert_eq!(approval.files_count, 1);
    assert!(approval.decision.is_empty());

    let conclusions = wait_for_rows(&memory, "pipeline.conclusion", "plan-1").await;
    assert_eq!(conclusions.len(), 1);
    assert_eq!(conclusions[0].payload["files_changed"], json!(["hello.js"]));
    assert_eq!(conclusions[0].payload["approved"], json!(true));
    assert_eq!(conclusions[0].payload["conclusion_text"], json!("all clean"));

    let pending_events = wait_for_rows(&memory, "pr.pending_approval", "plan-1").await;
    assert_eq!(pending_events.len(), 1);
}

#[tokio::test]
async fn approving_emits_human_approved_and_clears_pending() {
    let (state, memory) = gateway_state().await;
    let app = build_router(state.clone());

    state.bus.publish(&approved_security_event()).await.unwrap();
    wait_until("pending approval", || state.pending.len() == 1).await;
    let approval_id = state.pending.iter().next().unwrap().key().clone();

    let (status, body) = request(
        &app,
        "POST",
        &format!("/api/approvals/{approval_id}/approve"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("approved"));
    assert_eq!(state.pending.len(), 0);

    let decided = wait_for_rows(&memory, "pr.human_approved", "plan-1").await;
    assert_eq!(decided[0].payload["decision"], json!("approved"));

    // Deciding twice is a 404.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/api/approvals/{approval_id}/approve"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejecting_emits_human_rejected() {
    let (state, memory) = gateway_state().await;
    let app = build_router(state.clone());

    state.bus.publish(&approved_security_event()).await.unwrap();
    wait_until("pending approval", || state.pending.len() == 1).await;
    let approval_id = state.pending.iter().next().unwrap().key().clone();

    let (status, body) = request(
        &app,
        "POST",
        &format!("/api/approvals/{approval_id}/reject"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("rejected"));

    wait_for_rows(&memory, "pr.human_rejected", "plan-1").await;
    let approved = memory
        .get_events(Some("pr.human_approved"), Some("plan-1"), 10)
        .await
        .unwrap();
    assert!(approved.is_empty());
}

#[tokio::test]
async fn security_approval_without_context_is_ignored() {
    let (state, _memory) = gateway_state().await;

    let event = Envelope::new(
        "security_service",
        EventPayload::SecurityApproved(SecurityResult {
            plan_id: "plan-x".into(),
            branch_name: "b".into(),
            approved: true,
            violations: vec![],
            files_scanned: 0,
            pr_context: json!({}),
            reasoning: String::new(),
        }),
    )
    .unwrap();
    state.bus.publish(&event).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(state.pending.len(), 0);
}

#[tokio::test]
async fn unknown_approval_is_404() {
    let (state, _memory) = gateway_state().await;
    let app = build_router(state);
    let (status, _) = request(&app, "POST", "/api/approvals/ghost/approve", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn plan_proxy_is_idempotent_within_ttl() {
    let memory = start_memory().await;
    let bus = Arc::new(EventBus::new(Arc::new(Broker::new())));

    // Mock planner counting upstream calls.
    let calls = Arc::new(AtomicU32::new(0));
    let planner_calls = Arc::clone(&calls);
    let planner_app = Router::new()
        .route(
            "/plan",
            post(
                move |State(calls): State<Arc<AtomicU32>>, Json(_): Json<Value>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"plan_id": "p1", "task_count": 1, "tasks": []}))
                },
            ),
        )
        .with_state(planner_calls);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let planner_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, planner_app).await;
    });

    let config = GatewayConfig {
        planner_url: format!("http://{planner_addr}"),
        ..GatewayConfig::default()
    };
    let state = GatewayState::new(bus, memory, config);
    let app = build_router(state);

    let body = json!({"prompt": "hello", "project_name": "p", "repo_url": ""});
    let (status, first) = request(&app, "POST", "/api/plan", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = request(&app, "POST", "/api/plan", Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn plan_proxy_maps_upstream_failure_to_502() {
    let memory = start_memory().await;
    let bus = Arc::new(EventBus::new(Arc::new(Broker::new())));
    let config = GatewayConfig {
        // Nothing listens here.
        planner_url: "http://127.0.0.1:1".to_string(),
        ..GatewayConfig::default()
    };
    let state = GatewayState::new(bus, memory, config);
    let app = build_router(state);

    let (status, _) = request(
        &app,
        "POST",
        "/api/plan",
        Some(json!({"prompt": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn replan_publishes_confirmed_revision() {
    let (state, memory) = gateway_state().await;
    let app = build_router(state);

    let (status, body) = request(
        &app,
        "POST",
        "/api/replan",
        Some(json!({
            "original_plan_id": "plan-r",
            "new_plan_id": "plan-r2",
            "reason": "needs another pass",
            "suggestions": ["split the work"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_plan_id"], json!("plan-r2"));

    let rows = wait_for_rows(&memory, "plan.revision_confirmed", "plan-r").await;
    assert_eq!(rows[0].payload["new_plan_id"], json!("plan-r2"));
}

#[tokio::test]
async fn plan_metrics_aggregates_token_rows() {
    let (state, memory) = gateway_state().await;
    let app = build_router(state);

    for (service, prompt, completion) in [
        ("meta_planner", 100u64, 20u64),
        ("dev_service", 300, 80),
        ("dev_service", 200, 40),
    ] {
        let event = Envelope::new(
            service,
            EventPayload::MetricsTokensUsed(TokensUsed {
                plan_id: "plan-m".into(),
                service: service.into(),
                prompt_tokens: prompt,
                completion_tokens: completion,
            }),
        )
        .unwrap();
        memory.store_event(&event).await.unwrap();
    }

    let (status, body) = request(&app, "GET", "/api/plan_metrics/plan-m", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_prompt_tokens"], json!(600));
    assert_eq!(body["total_completion_tokens"], json!(140));
    assert_eq!(body["services"]["dev_service"]["prompt_tokens"], json!(500));
}

#[tokio::test]
async fn status_reports_pending_and_connections() {
    let (state, _memory) = gateway_state().await;
    let app = build_router(state);
    let (status, body) = request(&app, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pending_approvals"], json!(0));
    assert_eq!(body["ws_connections"], json!(0));
}
