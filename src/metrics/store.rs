use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::Measurement;

// ─── Configuration ───────────────────────────────────────────────

/// Once this long has passed without a flush, new pushes are dropped.
/// A broken delivery path then costs bounded loss instead of unbounded memory.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(120);

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe holding area for measurements awaiting delivery.
/// Middleware calls `push()`, the reporter calls `flush()`.
pub struct MetricBuffer {
    inner: Mutex<Inner>,
}

struct Inner {
    measurements: Vec<Measurement>,
    flushed_at: Instant,
}

// ─── MetricBuffer impl ───────────────────────────────────────────

impl MetricBuffer {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// A buffer whose staleness window opens at `flushed_at`.
    pub fn starting_at(flushed_at: Instant) -> Self {
        Self {
            inner: Mutex::new(Inner {
                measurements: Vec::new(),
                flushed_at,
            }),
        }
    }

    /// Queue a measurement. Returns `false` when it was dropped as stale.
    pub fn push(&self, measurement: Measurement) -> bool {
        self.push_at(measurement, Instant::now())
    }

    /// Drain everything pushed since the previous flush, in push order.
    pub fn flush(&self) -> Vec<Measurement> {
        self.flush_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Clock-explicit variants ─────────────────────────────────

    pub fn push_at(&self, measurement: Measurement, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        if now.saturating_duration_since(inner.flushed_at) > STALENESS_WINDOW {
            return false;
        }
        inner.measurements.push(measurement);
        true
    }

    pub fn flush_at(&self, now: Instant) -> Vec<Measurement> {
        let mut inner = self.inner.lock();
        inner.flushed_at = now;
        std::mem::take(&mut inner.measurements)
    }
}

impl Default for MetricBuffer {
    fn default() -> Self {
        Self::new()
    }
}
