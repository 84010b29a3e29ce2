//! Delivery of encoded reports to the collector.
//!
//! Each attempt is classified as success (2xx, done), rejection (any other
//! status, done: the collector will not change its mind) or transport
//! failure (retried after a short pause).

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{ReportBatch, ReportError};

// ─── Configuration ───────────────────────────────────────────────

pub const MAX_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(10);
pub const REPORTS_PATH: &str = "/v3/reports";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Transport seam ──────────────────────────────────────────────

/// Outcome of one POST attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    Rejection { status: u16, body: String },
    TransportFailure(String),
}

/// Sends one payload. Implement this to swap the HTTP stack (or fake it in tests).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, url: &str, payload: Bytes) -> SendOutcome;
}

/// `reqwest`-backed transport. Timeouts bound the length of a single attempt.
/// Redirects are not followed: a 3xx from the collector is a rejection.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &str, payload: Bytes) -> SendOutcome {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => SendOutcome::Success,
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unable to read body>".to_string());
                SendOutcome::Rejection { status, body }
            }
            Err(e) => SendOutcome::TransportFailure(e.to_string()),
        }
    }
}

// ─── ReportClient ────────────────────────────────────────────────

/// Posts report batches to `{base_url}/v3/reports` with bounded retries.
pub struct ReportClient<T: Transport = HttpTransport> {
    transport: T,
    url: String,
    retry_delay: Duration,
    shutdown: CancellationToken,
}

impl<T: Transport> ReportClient<T> {
    pub fn new(base_url: &str, transport: T, shutdown: CancellationToken) -> Self {
        Self {
            transport,
            url: format!("{}{}", base_url.trim().trim_end_matches('/'), REPORTS_PATH),
            retry_delay: RETRY_DELAY,
            shutdown,
        }
    }

    /// Override the pause between transport failures.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Encode and deliver `batch`. Expected failures are logged here and
    /// returned for the caller's information; nothing is ever retried later.
    pub async fn report_metrics(&self, batch: &ReportBatch) -> Result<(), ReportError> {
        let payload = Bytes::from(batch.encode()?);
        self.send_with_retries(payload).await
    }

    async fn send_with_retries(&self, payload: Bytes) -> Result<(), ReportError> {
        let mut attempt = 1;
        loop {
            debug!(bytes = payload.len(), url = %self.url, attempt, "Posting report");

            // Bytes clones share the buffer
            match self.transport.send(&self.url, payload.clone()).await {
                SendOutcome::Success => {
                    debug!(attempt, "Reported successfully");
                    return Ok(());
                }
                SendOutcome::Rejection { status, body } => {
                    error!(status, body = %body, "Reporter failed");
                    return Err(ReportError::Rejected { status, body });
                }
                SendOutcome::TransportFailure(message) if attempt >= MAX_ATTEMPTS => {
                    error!(url = %self.url, error = %message, "Could not connect to collector");
                    return Err(ReportError::Transport {
                        attempts: attempt,
                        message,
                    });
                }
                SendOutcome::TransportFailure(message) => {
                    debug!(attempt, error = %message, "Retrying after transport error");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            debug!("Shutdown during retry delay, dropping report");
                            return Err(ReportError::Cancelled);
                        }
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }

            attempt += 1;
        }
    }
}
