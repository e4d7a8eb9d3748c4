// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Three endpoints, matching the external-interface surface: `POST /webhook`
// (signal ingestion, HMAC-gated), `POST /refactored-exit-worker` (admin
// bearer-gated manual sweep trigger), and `GET /health` (public). Dashboards,
// the trade journal, and other read endpoints are external collaborators that
// call into `PositionManager`/`AuditLog`/`Metrics` directly — they are not
// part of this service's HTTP surface.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Bytes, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api::auth::AuthBearer;
use crate::app_state::CoreContext;
use crate::exit::worker::ExitWorker;
use crate::pipeline;
use crate::webhook::auth::verify_signature;

/// Shared state for the HTTP router: the decision-pipeline context plus the
/// exit worker the manual-sweep endpoint triggers on demand.
pub struct ApiState {
    pub ctx: Arc<CoreContext>,
    pub exit_worker: Arc<ExitWorker>,
}

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/refactored-exit-worker", post(trigger_exit_sweep))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    dependencies: HashMap<String, crate::observability::DependencyHealth>,
    uptime_seconds: u64,
    metrics: crate::observability::MetricsSnapshot,
}

async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let dependencies = state.ctx.degraded.snapshot();
    let status = if state.ctx.degraded.is_any_degraded() {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        dependencies,
        uptime_seconds: state.ctx.uptime_seconds(),
        metrics: state.ctx.metrics.snapshot(),
    })
}

// =============================================================================
// Webhook ingestion (HMAC-gated when FLOWGATE_WEBHOOK_SECRET is configured)
// =============================================================================

async fn webhook(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok());

    if !verify_signature(&body, signature) {
        warn!("webhook request rejected: bad signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "invalid signature" })),
        )
            .into_response();
    }

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "webhook request rejected: malformed JSON body");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "malformed JSON body" })),
            )
                .into_response();
        }
    };

    let response = pipeline::handle_webhook(state.ctx.clone(), raw).await;
    let status =
        StatusCode::from_u16(response.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}

// =============================================================================
// Manual exit sweep trigger (authenticated)
// =============================================================================

#[derive(serde::Deserialize)]
struct SweepQuery {
    #[serde(default)]
    dry_run: bool,
}

async fn trigger_exit_sweep(
    _auth: AuthBearer,
    State(state): State<Arc<ApiState>>,
    Query(query): Query<SweepQuery>,
) -> impl IntoResponse {
    let results = state.exit_worker.sweep(query.dry_run).await;
    Json(results)
}
