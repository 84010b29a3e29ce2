use axum::{
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::metrics::{queue_time, Measurement, MetricBuffer, MetricKind, UtilizationTracker};

pub const REQUEST_START_HEADER: &str = "x-request-start";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handles the middleware writes into.
#[derive(Clone)]
pub struct Instrumentation {
    pub config: Arc<Config>,
    pub buffer: Arc<MetricBuffer>,
    pub tracker: Arc<UtilizationTracker>,
}

/// Queue time for the current request, in milliseconds.
/// Available to handlers as a request extension when it could be measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTime(pub u64);

/// Records `at` and decrements occupancy however the handler exits
/// (return, panic, cancellation).
struct InFlight<'a> {
    buffer: &'a MetricBuffer,
    tracker: &'a UtilizationTracker,
    received_at: DateTime<Utc>,
    start: Instant,
}

impl<'a> InFlight<'a> {
    fn enter(inst: &'a Instrumentation, received_at: DateTime<Utc>) -> Self {
        inst.tracker.start();
        inst.tracker.incr();
        Self {
            buffer: &inst.buffer,
            tracker: &inst.tracker,
            received_at,
            start: Instant::now(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let app_ms = self.start.elapsed().as_millis() as u64;
        self.buffer
            .push(Measurement::new(MetricKind::AppTime, app_ms, self.received_at));
        self.tracker.decr();
    }
}

/// Tower-compatible middleware that records per-request telemetry:
///
///   qt — queue time, from the load balancer's X-Request-Start header
///   at — handler wall time in milliseconds
///
/// and toggles utilization occupancy around the handler.
pub async fn judoscale_middleware(
    State(inst): State<Instrumentation>,
    mut req: Request,
    next: Next,
) -> Response {
    let now = Utc::now();

    // ── Queue time ──────────────────────────────────────────────
    if let Some(raw) = header_str(req.headers(), REQUEST_START_HEADER) {
        let content_length = header_str(req.headers(), CONTENT_LENGTH.as_str())
            .and_then(|len| len.parse::<u64>().ok());

        if inst.config.should_track_queue_time(content_length) {
            match queue_time::normalize(raw, now) {
                Ok(ms) => {
                    inst.buffer
                        .push(Measurement::new(MetricKind::QueueTime, ms, now));
                    debug!(
                        queue_time_ms = ms,
                        request_id = header_str(req.headers(), REQUEST_ID_HEADER),
                        size = content_length,
                        "Request queue time"
                    );
                    req.extensions_mut().insert(QueueTime(ms));
                }
                Err(e) => warn!(error = %e, "Could not parse X-Request-Start header"),
            }
        }
    }

    // ── Occupancy + application time ────────────────────────────
    let _in_flight = InFlight::enter(&inst, now);
    next.run(req).await
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
