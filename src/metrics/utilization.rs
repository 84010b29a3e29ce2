use std::time::{Duration, Instant};

use parking_lot::Mutex;

// ─── Public types ────────────────────────────────────────────────

/// Tracks how much of each reporting cycle had at least one request in flight.
///
/// Occupancy count and idle bookkeeping live behind one lock: they only make
/// sense when they advance together. All time comes from the monotonic clock.
/// Middleware calls `incr()`/`decr()`, the reporter calls `utilization_pct()`.
pub struct UtilizationTracker {
    inner: Mutex<Inner>,
}

// ─── Internal state ──────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    active_requests: u32,
    /// `None` until the tracker is started
    cycle: Option<Cycle>,
}

/// Idle accounting for the current reporting cycle.
struct Cycle {
    started_at: Instant,
    /// `Some` while no request is in flight
    idle_since: Option<Instant>,
    idle_total: Duration,
}

impl Cycle {
    /// A fresh cycle that is idle from `now`.
    fn idle_from(now: Instant) -> Self {
        Self {
            started_at: now,
            idle_since: Some(now),
            idle_total: Duration::ZERO,
        }
    }

    fn idle_ratio(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started_at);
        if elapsed.is_zero() {
            return 0.0;
        }

        // Fold in the idle span still running, then move its start up to
        // `now` so the next read doesn't count it twice.
        if let Some(since) = self.idle_since {
            self.idle_total += now.saturating_duration_since(since);
            self.idle_since = Some(now);
        }

        self.idle_total.as_secs_f64() / elapsed.as_secs_f64()
    }

    fn reset(&mut self, now: Instant) {
        self.idle_total = Duration::ZERO;
        self.started_at = now;
    }
}

// ─── UtilizationTracker impl ─────────────────────────────────────

impl UtilizationTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Begin tracking. Only the first call has any effect.
    pub fn start(&self) {
        self.start_at(Instant::now());
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().cycle.is_some()
    }

    /// A request started.
    pub fn incr(&self) {
        self.incr_at(Instant::now());
    }

    /// A request finished. Unmatched calls are ignored.
    pub fn decr(&self) {
        self.decr_at(Instant::now());
    }

    /// Busy percentage (0–100) of the cycle so far, or `None` if the tracker
    /// was never started. With `reset`, a new cycle begins now.
    pub fn utilization_pct(&self, reset: bool) -> Option<u8> {
        self.utilization_pct_at(Instant::now(), reset)
    }

    pub fn active_requests(&self) -> u32 {
        self.inner.lock().active_requests
    }

    // ── Clock-explicit variants ─────────────────────────────────

    pub fn start_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        if inner.cycle.is_none() {
            inner.cycle = Some(Cycle::idle_from(now));
        }
    }

    pub fn incr_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        if inner.active_requests == 0 {
            if let Some(cycle) = inner.cycle.as_mut() {
                if let Some(since) = cycle.idle_since.take() {
                    cycle.idle_total += now.saturating_duration_since(since);
                }
            }
        }
        inner.active_requests = inner.active_requests.saturating_add(1);
    }

    pub fn decr_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        if inner.active_requests == 0 {
            return;
        }

        inner.active_requests -= 1;
        if inner.active_requests == 0 {
            if let Some(cycle) = inner.cycle.as_mut() {
                cycle.idle_since = Some(now);
            }
        }
    }

    pub fn utilization_pct_at(&self, now: Instant, reset: bool) -> Option<u8> {
        let mut inner = self.inner.lock();
        let cycle = inner.cycle.as_mut()?;

        let idle_ratio = cycle.idle_ratio(now);
        if reset {
            cycle.reset(now);
        }

        let pct = ((1.0 - idle_ratio) * 100.0).round().clamp(0.0, 100.0);
        Some(pct as u8)
    }
}

impl Default for UtilizationTracker {
    fn default() -> Self {
        Self::new()
    }
}
