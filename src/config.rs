//! Agent configuration, bindable from flags or environment variables.

use std::env;
use std::time::Duration;

use clap::{ArgAction, Parser};

/// Configuration for the telemetry agent
#[derive(Debug, Clone, Parser)]
#[command(name = "judoscale-demo")]
#[command(about = "Sample web app reporting queue time and utilization to Judoscale")]
pub struct Config {
    /// Collector base URL; reporting is disabled when unset or blank
    #[arg(long, env = "JUDOSCALE_URL")]
    pub api_base_url: Option<String>,

    /// Seconds between reports
    #[arg(long, env = "JUDOSCALE_REPORT_INTERVAL_SECS", default_value_t = 10)]
    pub report_interval_secs: u64,

    /// Requests with a larger body don't record queue time
    #[arg(long, env = "JUDOSCALE_MAX_REQUEST_SIZE_BYTES", default_value_t = 100_000)]
    pub max_request_size_bytes: u64,

    /// Skip queue time for requests larger than `max_request_size_bytes`
    #[arg(long, env = "JUDOSCALE_IGNORE_LARGE_REQUESTS", default_value_t = true, action = ArgAction::Set)]
    pub ignore_large_requests: bool,

    /// Master switch for instrumentation and reporting
    #[arg(long, env = "JUDOSCALE_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub enabled: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "JUDOSCALE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Container identifier; falls back to the hosting platform's
    #[arg(long, env = "JUDOSCALE_CONTAINER")]
    pub container: Option<String>,

    /// Address the sample app listens on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            report_interval_secs: 10,
            max_request_size_bytes: 100_000,
            ignore_large_requests: true,
            enabled: true,
            log_level: "info".to_string(),
            container: None,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line args and environment variables
    pub fn parse_config() -> Self {
        Config::parse()
    }

    /// Collector base URL, if set to something non-blank.
    pub fn api_base_url(&self) -> Option<&str> {
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.api_base_url().is_some()
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }

    /// Explicit container id, else Heroku's dyno name, else Render's instance id.
    pub fn runtime_container(&self) -> Option<String> {
        self.container
            .clone()
            .or_else(|| env::var("DYNO").ok())
            .or_else(|| env::var("RENDER_INSTANCE_ID").ok())
            .filter(|c| !c.trim().is_empty())
    }

    /// Large bodies take long enough to transfer that they skew queue time.
    pub fn should_track_queue_time(&self, content_length: Option<u64>) -> bool {
        if !self.ignore_large_requests {
            return true;
        }
        content_length.map_or(true, |len| len <= self.max_request_size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_url_is_not_configured() {
        let mut config = Config::default();
        assert!(!config.is_configured());

        config.api_base_url = Some("   ".to_string());
        assert!(!config.is_configured());

        config.api_base_url = Some(" https://adapter.judoscale.com/api/123 ".to_string());
        assert!(config.is_configured());
        assert_eq!(
            config.api_base_url(),
            Some("https://adapter.judoscale.com/api/123")
        );
    }

    #[test]
    fn defaults_match_flags() {
        let parsed = Config::parse_from(["judoscale-demo"]);
        let default = Config::default();

        assert_eq!(parsed.report_interval_secs, default.report_interval_secs);
        assert_eq!(parsed.max_request_size_bytes, default.max_request_size_bytes);
        assert_eq!(parsed.ignore_large_requests, default.ignore_large_requests);
        assert_eq!(parsed.enabled, default.enabled);
    }

    #[test]
    fn parses_explicit_flags() {
        let config = Config::parse_from([
            "judoscale-demo",
            "--api-base-url",
            "http://localhost:9000",
            "--report-interval-secs",
            "5",
            "--ignore-large-requests",
            "false",
            "--container",
            "web.3",
        ]);

        assert!(config.is_configured());
        assert_eq!(config.report_interval(), Duration::from_secs(5));
        assert!(!config.ignore_large_requests);
        assert_eq!(config.runtime_container().as_deref(), Some("web.3"));
    }

    #[test]
    fn large_requests_skip_queue_time() {
        let mut config = Config {
            max_request_size_bytes: 1_000,
            ..Config::default()
        };

        assert!(config.should_track_queue_time(None));
        assert!(config.should_track_queue_time(Some(1_000)));
        assert!(!config.should_track_queue_time(Some(1_001)));

        config.ignore_large_requests = false;
        assert!(config.should_track_queue_time(Some(1_000_000)));
    }
}
