use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::client::{ReportClient, Transport};
use super::{AgentIdentity, ReportBatch, ReportError};
use crate::config::Config;
use crate::metrics::{Measurement, MetricBuffer, MetricKind, UtilizationTracker};

// ─── Lifecycle state ─────────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    NotStarted = 0,
    Started = 1,
}

impl ReporterState {
    fn from_u8(raw: u8) -> Self {
        if raw == Self::Started as u8 {
            Self::Started
        } else {
            Self::NotStarted
        }
    }
}

/// What a single `run_once` did.
#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Not started, or no destination configured
    Skipped,
    /// Nothing buffered, the network was not touched
    Empty,
    Delivered { measurements: usize },
    /// The batch was dropped
    Failed,
}

// ─── Reporter ────────────────────────────────────────────────────

/// One reporting pass: sample utilization, flush, encode, deliver.
///
/// The host (or `spawn`) calls `run_once` on a fixed interval from a single
/// task; cycles must not overlap.
pub struct Reporter<T: Transport> {
    state: AtomicU8,
    /// `None` when no destination is configured
    client: Option<ReportClient<T>>,
    buffer: Arc<MetricBuffer>,
    tracker: Arc<UtilizationTracker>,
    identities: Vec<AgentIdentity>,
    container: Option<String>,
    interval: Duration,
}

impl<T: Transport> Reporter<T> {
    pub fn new(
        config: &Config,
        buffer: Arc<MetricBuffer>,
        tracker: Arc<UtilizationTracker>,
        transport: T,
        shutdown: CancellationToken,
    ) -> Self {
        let client = config
            .api_base_url()
            .map(|url| ReportClient::new(url, transport, shutdown));

        Self {
            state: AtomicU8::new(ReporterState::NotStarted as u8),
            client,
            buffer,
            tracker,
            identities: vec![AgentIdentity::current()],
            container: config.runtime_container(),
            interval: config.report_interval(),
        }
    }

    /// Replace the default identity list (e.g. when several integrations share a process).
    pub fn with_identities(mut self, identities: Vec<AgentIdentity>) -> Self {
        self.identities = identities;
        self
    }

    pub fn client(&self) -> Option<&ReportClient<T>> {
        self.client.as_ref()
    }

    pub fn state(&self) -> ReporterState {
        ReporterState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_started(&self) -> bool {
        self.state() == ReporterState::Started
    }

    /// Claim the started state. Returns `true` only for the call that made
    /// the transition; without a destination nothing happens.
    pub fn start(&self) -> bool {
        if self.client.is_none() {
            info!("Set JUDOSCALE_URL to enable metrics reporting");
            return false;
        }

        let claimed = self
            .state
            .compare_exchange(
                ReporterState::NotStarted as u8,
                ReporterState::Started as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if claimed {
            info!(
                interval_secs = self.interval.as_secs(),
                "Judoscale reporter starting"
            );
        }
        claimed
    }

    pub fn stop(&self) {
        self.state
            .store(ReporterState::NotStarted as u8, Ordering::Release);
    }

    /// Run one reporting pass. Never fails: errors and panics are logged and
    /// the batch is dropped, so the next scheduled cycle runs regardless.
    pub async fn run_once(&self) -> CycleOutcome {
        let Some(client) = self.client.as_ref() else {
            return CycleOutcome::Skipped;
        };
        if !self.is_started() {
            return CycleOutcome::Skipped;
        }

        match AssertUnwindSafe(self.report(client)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Reporter panicked during cycle, batch dropped");
                CycleOutcome::Failed
            }
        }
    }

    async fn report(&self, client: &ReportClient<T>) -> CycleOutcome {
        let now = Utc::now();
        if let Some(pct) = self.tracker.utilization_pct(true) {
            self.buffer
                .push(Measurement::new(MetricKind::Utilization, u64::from(pct), now));
            debug!(utilization_pct = pct, "Collected utilization");
        }

        let measurements = self.buffer.flush();
        if measurements.is_empty() {
            debug!("No metrics to report");
            return CycleOutcome::Empty;
        }

        let count = measurements.len();
        info!(count, "Reporting metrics");

        let batch = ReportBatch {
            measurements,
            identities: self.identities.clone(),
            container: self.container.clone(),
        };

        match client.report_metrics(&batch).await {
            Ok(()) => CycleOutcome::Delivered {
                measurements: count,
            },
            Err(e @ ReportError::Serialization(_)) => {
                error!(error = %e, "Reporter error: could not encode batch");
                CycleOutcome::Failed
            }
            // already logged by the client
            Err(_) => CycleOutcome::Failed,
        }
    }
}

impl<T: Transport + 'static> Reporter<T> {
    /// Run `run_once` every interval on a dedicated task until `shutdown` fires.
    /// The first report goes out one interval after spawning.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Tick every interval, skipping the immediate first tick
            let mut ticks = IntervalStream::new(interval).skip(1);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    tick = ticks.next() => {
                        if tick.is_none() {
                            break;
                        }
                        self.run_once().await;
                    }
                }
            }
            debug!("Reporter loop exited");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;
    use crate::report::SendOutcome;

    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicU32,
        last_payload: parking_lot::Mutex<Option<bytes::Bytes>>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, _url: &str, payload: bytes::Bytes) -> SendOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_payload.lock() = Some(payload);
            SendOutcome::Success
        }
    }

    struct PanickingTransport;

    #[async_trait]
    impl Transport for PanickingTransport {
        async fn send(&self, _url: &str, _payload: bytes::Bytes) -> SendOutcome {
            panic!("transport blew up");
        }
    }

    fn configured() -> Config {
        Config {
            api_base_url: Some("http://collector.test".into()),
            container: Some("web.1".into()),
            ..Config::default()
        }
    }

    fn reporter_with<T: Transport>(config: &Config, transport: T) -> Reporter<T> {
        Reporter::new(
            config,
            Arc::new(MetricBuffer::new()),
            Arc::new(UtilizationTracker::new()),
            transport,
            CancellationToken::new(),
        )
    }

    fn calls(reporter: &Reporter<CountingTransport>) -> u32 {
        reporter
            .client()
            .map(|c| c.transport().calls.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn push_qt(reporter: &Reporter<CountingTransport>) {
        reporter
            .buffer
            .push(Measurement::new(MetricKind::QueueTime, 10, Utc::now()));
    }

    #[tokio::test]
    async fn no_op_before_start() {
        let reporter = reporter_with(&configured(), CountingTransport::default());
        push_qt(&reporter);

        assert_eq!(reporter.run_once().await, CycleOutcome::Skipped);
        assert_eq!(calls(&reporter), 0);
        assert_eq!(reporter.buffer.len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_never_starts() {
        let reporter = reporter_with(&Config::default(), CountingTransport::default());

        assert!(!reporter.start());
        assert_eq!(reporter.state(), ReporterState::NotStarted);
        assert!(reporter.client().is_none());
        assert_eq!(reporter.run_once().await, CycleOutcome::Skipped);
    }

    #[tokio::test]
    async fn start_is_claimed_once() {
        let reporter = reporter_with(&configured(), CountingTransport::default());

        assert!(reporter.start());
        assert!(!reporter.start());
        assert!(reporter.is_started());
    }

    #[tokio::test]
    async fn delivers_flushed_measurements() {
        let reporter = reporter_with(&configured(), CountingTransport::default());
        reporter.start();
        push_qt(&reporter);
        push_qt(&reporter);

        assert_eq!(
            reporter.run_once().await,
            CycleOutcome::Delivered { measurements: 2 }
        );
        assert_eq!(calls(&reporter), 1);
        assert!(reporter.buffer.is_empty());

        let payload = reporter
            .client()
            .and_then(|c| c.transport().last_payload.lock().clone())
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["container"], "web.1");
        assert_eq!(value["metrics"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_cycle_skips_network() {
        let reporter = reporter_with(&configured(), CountingTransport::default());
        reporter.start();

        assert_eq!(reporter.run_once().await, CycleOutcome::Empty);
        assert_eq!(calls(&reporter), 0);
    }

    #[tokio::test]
    async fn samples_utilization_once_tracker_started() {
        let reporter = reporter_with(&configured(), CountingTransport::default());
        reporter.start();
        reporter.tracker.start();

        assert_eq!(
            reporter.run_once().await,
            CycleOutcome::Delivered { measurements: 1 }
        );

        let payload = reporter
            .client()
            .and_then(|c| c.transport().last_payload.lock().clone())
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["metrics"][0][2], "up");
    }

    #[tokio::test]
    async fn stop_makes_cycles_no_ops_again() {
        let reporter = reporter_with(&configured(), CountingTransport::default());
        reporter.start();
        reporter.stop();
        push_qt(&reporter);

        assert_eq!(reporter.run_once().await, CycleOutcome::Skipped);
        assert_eq!(calls(&reporter), 0);

        assert!(reporter.start());
        assert_eq!(
            reporter.run_once().await,
            CycleOutcome::Delivered { measurements: 1 }
        );
    }

    #[tokio::test]
    async fn panicking_cycle_is_contained() {
        let reporter = reporter_with(&configured(), PanickingTransport);
        reporter.start();
        reporter
            .buffer
            .push(Measurement::new(MetricKind::AppTime, 3, Utc::now()));

        assert_eq!(reporter.run_once().await, CycleOutcome::Failed);
        // the next cycle still runs
        assert_eq!(reporter.run_once().await, CycleOutcome::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_reports_each_interval_until_shutdown() {
        let config = Config {
            report_interval_secs: 10,
            ..configured()
        };
        let reporter = Arc::new(reporter_with(&config, CountingTransport::default()));
        reporter.start();
        reporter.tracker.start();

        let shutdown = CancellationToken::new();
        let handle = reporter.clone().spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(calls(&reporter), 2);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
