//! HTTP server for the demo service and the heal webhook.
//!
//! Provides REST API endpoints for:
//! - Health and readiness probes (with a simulated-unhealthy toggle)
//! - The demo compute endpoint
//! - Authenticated heal requests

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::authorize;
use crate::compute::compute_ratio;
use crate::error::OrchestratorError;
use crate::health::HealthSource;
use crate::orchestrator::HealOrchestrator;

/// Server state shared across handlers.
pub struct AppState {
    /// Health reported by the probe routes
    pub health: Arc<dyn HealthSource>,
    /// Heal request orchestrator
    pub orchestrator: HealOrchestrator,
    /// Secret expected in `Authorization: Bearer`; `None` rejects every heal request
    pub heal_token: Option<String>,
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/__simulate/unhealthy", post(simulate_unhealthy_handler))
        .route("/__simulate/healthy", post(simulate_healthy_handler))
        .route("/compute", post(compute_handler))
        .route("/heal", post(heal_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the address.
pub async fn run_server(state: Arc<AppState>, addr: &str) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Healer server listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealRequest {
    correlation_id: String,
    #[serde(default)]
    payload: Map<String, Value>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn healthz_handler(State(state): State<Arc<AppState>>) -> Response {
    if state.health.is_healthy() {
        Json(json!({"status": "ok"})).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy", "reason": "simulated"})),
        )
            .into_response()
    }
}

async fn readyz_handler() -> impl IntoResponse {
    Json(json!({"status": "ready"}))
}

async fn simulate_unhealthy_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.health.set_simulated_unhealthy(true);
    warn!("Simulated unhealthy state enabled");
    Json(json!({"status": "ok", "simulation": "unhealthy_enabled"}))
}

async fn simulate_healthy_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.health.set_simulated_unhealthy(false);
    info!("Simulated unhealthy state disabled");
    Json(json!({"status": "ok", "simulation": "unhealthy_disabled"}))
}

/// Any body that does not carry two numeric operands is a validation error,
/// so malformed input always takes the 400 path.
async fn compute_handler(body: Bytes) -> Response {
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let operand = |name: &str| request.get(name).and_then(Value::as_f64);

    match compute_ratio(operand("numerator"), operand("denominator")) {
        Ok(result) => Json(json!({"result": result})).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": {"error": "invalid_input", "message": e.to_string()}})),
        )
            .into_response(),
    }
}

/// Authenticates before the body is parsed so unauthenticated requests never
/// learn anything about the payload contract.
async fn heal_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = authorize(&headers, state.heal_token.as_deref()) {
        warn!(error = %e, "Rejected heal request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized", "message": e.to_string()})),
        )
            .into_response();
    }

    let request: HealRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_request", "message": e.to_string()})),
            )
                .into_response();
        }
    };

    info!(correlation_id = %request.correlation_id, "Received heal request");

    match state
        .orchestrator
        .heal(&request.correlation_id, request.payload)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(OrchestratorError::Reporting(e)) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": "reporting_failed", "message": e.to_string()})),
        )
            .into_response(),
    }
}
