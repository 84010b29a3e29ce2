//! In-process autoscaling telemetry.
//!
//! Request middleware measures queue time and application time and toggles
//! utilization occupancy; a periodic [`Reporter`] samples utilization, flushes
//! the buffered measurements and ships them to the collector.
//!
//! ```no_run
//! use judoscale_agent::{Agent, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let shutdown = CancellationToken::new();
//! let agent = Agent::new(Config::parse_config(), shutdown.clone())?;
//! let app = agent.instrument(axum::Router::<()>::new());
//! agent.reporter.start();
//! let loop_handle = agent.reporter.clone().spawn(shutdown.clone());
//! # Ok(()) }
//! ```

pub mod config;
pub mod metrics;
pub mod middleware;
pub mod report;

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;

pub use config::Config;
pub use metrics::{Measurement, MetricBuffer, MetricKind, UtilizationTracker};
pub use middleware::{Instrumentation, QueueTime};
pub use report::{AgentIdentity, HttpTransport, ReportError, Reporter};

/// Everything a host needs: the shared buffer and tracker plus the reporter
/// that drains them.
pub struct Agent {
    pub config: Arc<Config>,
    pub buffer: Arc<MetricBuffer>,
    pub tracker: Arc<UtilizationTracker>,
    pub reporter: Arc<Reporter<HttpTransport>>,
}

impl Agent {
    pub fn new(config: Config, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let buffer = Arc::new(MetricBuffer::new());
        let tracker = Arc::new(UtilizationTracker::new());
        let reporter = Arc::new(Reporter::new(
            &config,
            buffer.clone(),
            tracker.clone(),
            HttpTransport::new()?,
            shutdown,
        ));

        Ok(Self {
            config,
            buffer,
            tracker,
            reporter,
        })
    }

    pub fn instrumentation(&self) -> Instrumentation {
        Instrumentation {
            config: self.config.clone(),
            buffer: self.buffer.clone(),
            tracker: self.tracker.clone(),
        }
    }

    /// Wrap `router` with the request middleware, unless disabled by config.
    pub fn instrument<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        if !self.config.enabled {
            return router;
        }
        router.layer(axum::middleware::from_fn_with_state(
            self.instrumentation(),
            middleware::judoscale_middleware,
        ))
    }
}
