use axum::{extract::Query, routing::get, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;

use judoscale_agent::{Agent, QueueTime};

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HomeParams {
    /// Seconds the handler should pretend to work
    pub sleep: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub reporting_to: Option<String>,
    pub sleep_secs: Option<f64>,
    pub request_duration_ms: u64,
    pub queue_time_ms: Option<u64>,
}

/// Builds the sample app `Router`, wrapped in the telemetry middleware.
pub fn create_router(agent: &Agent) -> Router {
    let reporting_to = agent.config.api_base_url().map(str::to_owned);

    let app: Router = Router::new()
        // ── Sample endpoints ────────────────────────────────────
        .route(
            "/",
            get(
                move |params: Query<HomeParams>, queue_time: Option<Extension<QueueTime>>| {
                    home(reporting_to.clone(), params, queue_time)
                },
            ),
        )
        .route("/health", get(health));

    // ── Global middleware (applied bottom-up) ───────────────────
    agent.instrument(app).layer(TraceLayer::new_for_http())
}

// ─── GET / ───────────────────────────────────────────────────────

async fn home(
    reporting_to: Option<String>,
    Query(params): Query<HomeParams>,
    queue_time: Option<Extension<QueueTime>>,
) -> Json<HomeResponse> {
    let start = Instant::now();

    if let Some(secs) = params.sleep.filter(|s| s.is_finite() && *s > 0.0) {
        tokio::time::sleep(Duration::from_secs_f64(secs.min(60.0))).await;
    }

    Json(HomeResponse {
        reporting_to,
        sleep_secs: params.sleep,
        request_duration_ms: start.elapsed().as_millis() as u64,
        queue_time_ms: queue_time.map(|Extension(QueueTime(ms))| ms),
    })
}

// ─── GET /health ─────────────────────────────────────────────────

async fn health() -> &'static str {
    "OK"
}
