//! Integration tests for the HTTP surface.
//!
//! These drive the router in-process with `oneshot` and record lifecycle
//! events with an in-memory sink instead of a live hub.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use healer::error::RemediationError;
use healer::health::{HealthSource, HealthState};
use healer::server::{build_router, AppState};
use healer::{HealOrchestrator, HealOutcome, Healer, PatchHealer, RemediationEngine};
use notify::{EventEnvelope, EventSink, ReporterError, Severity, HEAL_ATTEMPTED};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const TOKEN: &str = "s3cret";

// =============================================================================
// Fixtures
// =============================================================================

/// In-memory sink that records `(event_type, severity, payload)`.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(String, Severity, Map<String, Value>)>>,
    fail_on: Option<&'static str>,
}

impl RecordingSink {
    fn types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(
        &self,
        correlation_id: &str,
        event_type: &str,
        severity: Severity,
        payload: Map<String, Value>,
    ) -> Result<EventEnvelope, ReporterError> {
        self.events
            .lock()
            .unwrap()
            .push((event_type.to_string(), severity, payload.clone()));
        if self.fail_on == Some(event_type) {
            return Err(ReporterError::Server { status: 503 });
        }
        Ok(EventEnvelope::new(correlation_id, event_type, severity, payload))
    }
}

/// Blocks until cancelled.
struct StuckHealer;

impl Healer for StuckHealer {
    fn heal(
        &self,
        _payload: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<HealOutcome, RemediationError> {
        while !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(RemediationError::Cancelled)
    }
}

/// Lay out a target project with the zero-division guard missing.
fn broken_target(root: &Path) {
    std::fs::create_dir_all(root.join("app")).unwrap();
    std::fs::create_dir_all(root.join("tests")).unwrap();
    std::fs::write(
        root.join("app/logic.py"),
        "def compute_ratio(numerator, denominator):\n    return numerator / denominator\n",
    )
    .unwrap();
    std::fs::write(
        root.join("tests/test_compute.py"),
        "def test_placeholder():\n    assert True\n",
    )
    .unwrap();
}

fn app(sink: Arc<RecordingSink>, healer: Arc<dyn Healer>, token: Option<&str>) -> Router {
    let orchestrator =
        HealOrchestrator::new(sink, healer).with_timeout(Duration::from_millis(200));
    build_router(Arc::new(AppState {
        health: Arc::new(HealthState::new()),
        orchestrator,
        heal_token: token.map(str::to_string),
    }))
}

fn default_app() -> Router {
    app(
        Arc::new(RecordingSink::default()),
        Arc::new(StuckHealer),
        Some(TOKEN),
    )
}

fn heal_request(token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/heal")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// =============================================================================
// Demo service
// =============================================================================

#[tokio::test]
async fn test_health_toggle() {
    let app = default_app();

    let (status, body) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (_, body) = send(&app, post_empty("/__simulate/unhealthy")).await;
    assert_eq!(body["simulation"], "unhealthy_enabled");

    let (status, body) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"status": "unhealthy", "reason": "simulated"}));

    send(&app, post_empty("/__simulate/healthy")).await;
    let (status, _) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_readyz() {
    let (status, body) = send(&default_app(), get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_compute() {
    let app = default_app();
    let request = |body: Value| {
        Request::builder()
            .method("POST")
            .uri("/compute")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let (status, body) = send(&app, request(json!({"numerator": 6, "denominator": 3}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], 2.0);

    let (status, body) = send(&app, request(json!({"numerator": 1, "denominator": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"]["error"], "invalid_input");
    assert_eq!(body["detail"]["message"], "denominator must be non-zero");

    let (status, body) = send(&app, request(json!({"numerator": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["detail"]["message"],
        "numerator and denominator must be numbers"
    );
}

#[tokio::test]
async fn test_compute_rejects_non_numeric_operands() {
    let app = default_app();
    let bodies = [
        json!({"numerator": "abc", "denominator": 2}).to_string(),
        json!({"numerator": 1, "denominator": null}).to_string(),
        json!({"numerator": true, "denominator": 2}).to_string(),
        "not json".to_string(),
    ];

    for raw in bodies {
        let request = Request::builder()
            .method("POST")
            .uri("/compute")
            .header("content-type", "application/json")
            .body(Body::from(raw.clone()))
            .unwrap();

        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {raw}");
        assert_eq!(body["detail"]["error"], "invalid_input");
        assert_eq!(
            body["detail"]["message"],
            "numerator and denominator must be numbers"
        );
    }
}

/// Always unhealthy; records toggles.
#[derive(Default)]
struct DegradedHealth {
    toggles: Mutex<Vec<bool>>,
}

impl HealthSource for DegradedHealth {
    fn is_healthy(&self) -> bool {
        false
    }

    fn set_simulated_unhealthy(&self, unhealthy: bool) {
        self.toggles.lock().unwrap().push(unhealthy);
    }
}

#[tokio::test]
async fn test_routes_read_any_health_source() {
    let health = Arc::new(DegradedHealth::default());
    let orchestrator = HealOrchestrator::new(
        Arc::new(RecordingSink::default()),
        Arc::new(StuckHealer),
    );
    let app = build_router(Arc::new(AppState {
        health: health.clone(),
        orchestrator,
        heal_token: None,
    }));

    let (status, _) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    send(&app, post_empty("/__simulate/healthy")).await;
    assert_eq!(*health.toggles.lock().unwrap(), vec![false]);
}

// =============================================================================
// Heal webhook
// =============================================================================

#[tokio::test]
async fn test_heal_requires_token() {
    let sink = Arc::new(RecordingSink::default());
    let app = app(sink.clone(), Arc::new(StuckHealer), Some(TOKEN));
    let body = json!({"correlationId": "corr-1", "payload": {}});

    let (status, response) = send(&app, heal_request(None, &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], "unauthorized");

    let (status, _) = send(&app, heal_request(Some("wrong"), &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(sink.types().is_empty());
}

#[tokio::test]
async fn test_heal_rejected_when_secret_unset() {
    let sink = Arc::new(RecordingSink::default());
    let app = app(sink.clone(), Arc::new(StuckHealer), None);
    let body = json!({"correlationId": "corr-1", "payload": {}});

    let (status, _) = send(&app, heal_request(Some(TOKEN), &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(sink.types().is_empty());
}

#[tokio::test]
async fn test_heal_rejects_malformed_body() {
    let (status, body) = send(
        &default_app(),
        heal_request(Some(TOKEN), &json!({"payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_heal_applies_known_fix() {
    let dir = tempfile::tempdir().unwrap();
    broken_target(dir.path());
    let sink = Arc::new(RecordingSink::default());
    let healer = PatchHealer::new(RemediationEngine::new(dir.path()));
    let app = app(sink.clone(), Arc::new(healer), Some(TOKEN));

    let body = json!({
        "correlationId": "corr-123",
        "payload": {"output": "tests/test_compute.py:10: ZeroDivisionError: division by zero"}
    });
    let (status, response) = send(&app, heal_request(Some(TOKEN), &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "completed");
    assert_eq!(
        response["changedFiles"],
        json!(["app/logic.py", "tests/test_compute.py"])
    );
    assert_eq!(sink.types(), vec!["heal.attempted", "heal.completed"]);

    let logic = std::fs::read_to_string(dir.path().join("app/logic.py")).unwrap();
    assert!(logic.contains("if denominator == 0:"));
}

#[tokio::test]
async fn test_heal_escalates_unknown_signature() {
    let dir = tempfile::tempdir().unwrap();
    broken_target(dir.path());
    let sink = Arc::new(RecordingSink::default());
    let healer = PatchHealer::new(RemediationEngine::new(dir.path()));
    let app = app(sink.clone(), Arc::new(healer), Some(TOKEN));

    let output: Vec<String> = (0..150).map(|i| format!("line {i}")).collect();
    let body = json!({
        "correlationId": "corr-456",
        "payload": {"logs": output.join("\n")}
    });
    let (status, response) = send(&app, heal_request(Some(TOKEN), &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "escalated");
    assert_eq!(response["reasonCode"], "unknown_failure_signature");
    let preview = response["humanContext"]["failingOutputPreview"]
        .as_array()
        .unwrap();
    assert_eq!(preview.len(), 100);
    assert_eq!(preview[0], "line 0");

    let events = sink.events.lock().unwrap();
    assert_eq!(events[1].0, "heal.escalated");
    assert_eq!(events[1].1, Severity::Warn);
    assert_eq!(events[1].2["reasonCode"], "unknown_failure_signature");
}

#[tokio::test]
async fn test_heal_timeout_escalates() {
    let sink = Arc::new(RecordingSink::default());
    let app = app(sink.clone(), Arc::new(StuckHealer), Some(TOKEN));

    let body = json!({"correlationId": "corr-slow", "payload": {}});
    let (status, response) = send(&app, heal_request(Some(TOKEN), &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "escalated");
    assert_eq!(response["reasonCode"], "healer_timeout");
    assert_eq!(sink.types(), vec!["heal.attempted", "heal.escalated"]);
}

#[tokio::test]
async fn test_heal_reporting_failure_is_bad_gateway() {
    let sink = Arc::new(RecordingSink {
        events: Mutex::new(Vec::new()),
        fail_on: Some(HEAL_ATTEMPTED),
    });
    let app = app(sink.clone(), Arc::new(StuckHealer), Some(TOKEN));

    let body = json!({"correlationId": "corr-down", "payload": {}});
    let (status, response) = send(&app, heal_request(Some(TOKEN), &body)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(response["error"], "reporting_failed");
    assert_eq!(sink.types(), vec!["heal.attempted"]);
}
