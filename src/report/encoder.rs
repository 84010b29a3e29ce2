//! JSON wire format for `POST /v3/reports`.
//!
//! ```text
//! {"container":"web.1","pid":42,
//!  "metrics":[[1705314600,100,"qt"],[1705314600,5,"qd","default"]],
//!  "adapters":{"judoscale-rust":{"adapter_version":"0.1.0"}}}
//! ```
//!
//! Metrics are positional arrays; consumers tell the two shapes apart by
//! length, so element order is fixed.

use std::collections::BTreeMap;

use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

use super::{AgentIdentity, ReportBatch, ReportError};
use crate::metrics::Measurement;

// ─── Wire types ──────────────────────────────────────────────────

#[derive(Serialize)]
struct Report<'a> {
    container: &'a str,
    pid: i64,
    metrics: Vec<WireMetric<'a>>,
    adapters: BTreeMap<&'a str, AdapterEntry<'a>>,
}

#[derive(Serialize)]
struct AdapterEntry<'a> {
    adapter_version: &'a str,
}

/// `[epochSeconds, value, identifier]` or `[epochSeconds, value, identifier, group]`
struct WireMetric<'a>(&'a Measurement);

impl Serialize for WireMetric<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let m = self.0;
        let len = if m.group.is_some() { 4 } else { 3 };

        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&m.time.timestamp())?;
        seq.serialize_element(&m.value)?;
        seq.serialize_element(m.kind.as_str())?;
        if let Some(group) = &m.group {
            seq.serialize_element(group)?;
        }
        seq.end()
    }
}

// ─── Public entry points ─────────────────────────────────────────

/// Serialize measurements plus agent identity into the report body.
/// A missing container becomes `""`, a missing pid becomes `-1`.
pub fn encode_report(
    measurements: &[Measurement],
    identities: &[AgentIdentity],
    container: Option<&str>,
    pid: Option<u32>,
) -> Result<Vec<u8>, ReportError> {
    let report = Report {
        container: container.unwrap_or(""),
        pid: pid.map(i64::from).unwrap_or(-1),
        metrics: measurements.iter().map(WireMetric).collect(),
        adapters: identities
            .iter()
            .map(|id| {
                (
                    id.name.as_str(),
                    AdapterEntry {
                        adapter_version: id.version.as_str(),
                    },
                )
            })
            .collect(),
    };

    Ok(serde_json::to_vec(&report)?)
}

impl ReportBatch {
    /// Encode this batch as reported by the current process.
    pub fn encode(&self) -> Result<Vec<u8>, ReportError> {
        encode_report(
            &self.measurements,
            &self.identities,
            self.container.as_deref(),
            Some(std::process::id()),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use super::*;
    use crate::metrics::MetricKind;

    fn time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    fn identity() -> AgentIdentity {
        AgentIdentity::new("judoscale-test", "1.0.0")
    }

    fn encode_json(
        measurements: &[Measurement],
        container: Option<&str>,
        pid: Option<u32>,
    ) -> (String, Value) {
        let bytes = encode_report(measurements, &[identity()], container, pid).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let value = serde_json::from_str(&text).unwrap();
        (text, value)
    }

    #[test]
    fn formats_web_metrics_as_three_element_arrays() {
        let metrics = vec![
            Measurement::new(MetricKind::QueueTime, 100, time()),
            Measurement::new(MetricKind::AppTime, 50, time()),
        ];

        let (text, value) = encode_json(&metrics, Some("web.1"), Some(4242));

        assert!(text.contains("[1705314600,100,\"qt\"]"));
        assert!(text.contains("[1705314600,50,\"at\"]"));
        assert_eq!(value["container"], "web.1");
        assert_eq!(value["pid"], 4242);
        assert_eq!(
            value["adapters"],
            json!({ "judoscale-test": { "adapter_version": "1.0.0" } })
        );
    }

    #[test]
    fn appends_group_as_fourth_element() {
        let metrics =
            vec![Measurement::new(MetricKind::QueueDepth, 5, time()).with_group("default")];

        let (text, _) = encode_json(&metrics, Some("web.1"), Some(1));
        assert!(text.contains("[1705314600,5,\"qd\",\"default\"]"));
    }

    #[test]
    fn escapes_operator_supplied_groups() {
        let metrics = vec![
            Measurement::new(MetricKind::QueueDepth, 5, time()).with_group("queue\"with\\special"),
        ];

        let (text, value) = encode_json(&metrics, None, None);
        assert!(text.contains(r#""queue\"with\\special""#));
        assert_eq!(value["metrics"][0][3], "queue\"with\\special");
    }

    #[test]
    fn defaults_container_and_pid() {
        let (text, value) = encode_json(&[], None, None);

        assert!(text.contains("\"metrics\":[]"));
        assert_eq!(value["container"], "");
        assert_eq!(value["pid"], -1);
    }

    #[test]
    fn lists_every_identity() {
        let identities = vec![
            AgentIdentity::new("judoscale-rust", "0.1.0"),
            AgentIdentity::new("judoscale-jobs", "2.0.0"),
        ];
        let bytes = encode_report(&[], &identities, Some(""), Some(7)).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["adapters"]["judoscale-rust"]["adapter_version"], "0.1.0");
        assert_eq!(value["adapters"]["judoscale-jobs"]["adapter_version"], "2.0.0");
    }

    #[test]
    fn batch_encodes_with_current_pid() {
        let batch = ReportBatch {
            measurements: vec![Measurement::new(MetricKind::Utilization, 42, time())],
            identities: vec![AgentIdentity::current()],
            container: Some("web.2".into()),
        };

        let value: Value = serde_json::from_slice(&batch.encode().unwrap()).unwrap();
        assert_eq!(value["pid"], i64::from(std::process::id()));
        assert_eq!(value["metrics"], json!([[1705314600, 42, "up"]]));
        assert_eq!(value["container"], "web.2");
    }
}
