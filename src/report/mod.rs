pub mod client;
pub mod encoder;
pub mod reporter;

use thiserror::Error;

use crate::metrics::Measurement;

pub use client::{HttpTransport, ReportClient, SendOutcome, Transport};
pub use encoder::encode_report;
pub use reporter::Reporter;

/// Name/version of the integration producing reports, so the collector can
/// tell several integrations in one process apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentIdentity {
    pub name: String,
    pub version: String,
}

impl AgentIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Identity of this crate.
    pub fn current() -> Self {
        Self::new("judoscale-rust", env!("CARGO_PKG_VERSION"))
    }
}

/// Everything one reporting cycle sends. Lives for a single cycle only.
#[derive(Debug, Clone)]
pub struct ReportBatch {
    pub measurements: Vec<Measurement>,
    pub identities: Vec<AgentIdentity>,
    pub container: Option<String>,
}

/// Why a batch was not delivered.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("collector rejected report with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("could not reach collector after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    #[error("report delivery cancelled")]
    Cancelled,

    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReportError {
    /// Only serialization failures indicate a bug rather than a runtime condition.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }
}
