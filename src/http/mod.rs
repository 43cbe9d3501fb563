/// Embedded health endpoint for `--cloud-mode` (§6). Grounded on the
/// `orc2626-tech-sBot9999` REST router shape: a `Router` built once over
/// an `Arc<AppState>`, CORS layered permissively, a public `/health` route
/// with no auth. This crate has no authenticated surface to mount
/// alongside it, so the router only carries the aliases the spec names.
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use crate::time::Phase;

/// Shared state the health handler reads. The orchestrator updates
/// `phase`/`running` as it transitions; `started_at` is fixed at boot.
pub struct AppState {
    pub phase: RwLock<Phase>,
    pub running: RwLock<bool>,
    pub started_at: Instant,
    pub metrics: RwLock<HealthMetrics>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HealthMetrics {
    pub open_positions: usize,
    pub trades_today: usize,
    pub cash_balance: f64,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            phase: RwLock::new(Phase::Idle),
            running: RwLock::new(true),
            started_at: Instant::now(),
            metrics: RwLock::new(HealthMetrics::default()),
        }
    }

    pub async fn set_phase(&self, phase: Phase) {
        *self.phase.write().await = phase;
    }

    pub async fn set_metrics(&self, metrics: HealthMetrics) {
        *self.metrics.write().await = metrics;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    phase: &'static str,
    running: bool,
    uptime_s: u64,
    metrics: HealthMetrics,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let phase = *state.phase.read().await;
    let running = *state.running.read().await;
    let metrics = *state.metrics.read().await;

    Json(HealthResponse {
        status: "ok",
        phase: phase.as_str(),
        running,
        uptime_s: state.started_at.elapsed().as_secs(),
        metrics,
    })
}

/// `GET /health`, plus the `/` and `/api/health` aliases the spec requires
/// (§6: "`GET /` and `/api/health` alias").
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/", get(health))
        .route("/api/health", get(health))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_route_reports_ok_status() {
        let state = Arc::new(AppState::new());
        let app = router(state);

        let response = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn root_and_api_alias_both_respond() {
        let state = Arc::new(AppState::new());
        let app = router(state);

        for path in ["/", "/api/health"] {
            let app = app.clone();
            let response = app.oneshot(Request::builder().uri(path).body(Body::empty()).unwrap()).await.unwrap();
            assert_eq!(response.status(), axum::http::StatusCode::OK, "path {path}");
        }
    }
}
