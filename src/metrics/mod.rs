pub mod queue_time;
pub mod store;
pub mod utilization;

use std::fmt;

use chrono::{DateTime, Utc};

pub use queue_time::QueueTimeError;
pub use store::MetricBuffer;
pub use utilization::UtilizationTracker;

/// Short wire tag identifying what a measurement measures.
///
/// The set is closed so an identifier can never be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// `qt`: time spent between the network edge and this process (ms)
    QueueTime,
    /// `at`: time this process spent handling the request (ms)
    AppTime,
    /// `nt`: network transfer time (ms)
    NetworkTime,
    /// `up`: busy percentage of the last reporting cycle
    Utilization,
    /// `qd`: depth of a named work queue
    QueueDepth,
    /// `ql`: latency of a named work queue (ms)
    QueueLatency,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueueTime => "qt",
            Self::AppTime => "at",
            Self::NetworkTime => "nt",
            Self::Utilization => "up",
            Self::QueueDepth => "qd",
            Self::QueueLatency => "ql",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation waiting for delivery.
/// The write side: middleware and the reporter create these and push them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub kind: MetricKind,
    pub value: u64,
    /// Wall-clock instant the observation refers to
    pub time: DateTime<Utc>,
    /// Operator-supplied group (e.g. a queue name); web metrics leave it unset
    pub group: Option<String>,
}

impl Measurement {
    pub fn new(kind: MetricKind, value: u64, time: DateTime<Utc>) -> Self {
        Self {
            kind,
            value,
            time,
            group: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}
