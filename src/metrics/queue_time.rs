//! Queue time from a request-start header.
//!
//! Load balancers stamp requests with their arrival time in whatever unit they
//! like: Heroku sends milliseconds, Render sends nanoseconds, NGINX sends
//! fractional seconds (`t=1705314600.123`). The unit is inferred from the
//! magnitude of the value.

use chrono::{DateTime, Utc};
use thiserror::Error;

// ─── Unit cutoffs ────────────────────────────────────────────────

/// 2000-01-01T00:00:00Z in epoch milliseconds.
const MILLISECONDS_CUTOFF: i64 = 946_684_800_000;
const MICROSECONDS_CUTOFF: i64 = MILLISECONDS_CUTOFF * 1_000;
const NANOSECONDS_CUTOFF: i64 = MICROSECONDS_CUTOFF * 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueTimeError {
    #[error("request start value {raw:?} is not parseable")]
    NotParseable { raw: String },
}

// ─── Public entry point ──────────────────────────────────────────

/// Milliseconds elapsed between the request-start header value and `now`.
///
/// Everything but digits and `.` is stripped first. Integer values go through
/// integer arithmetic, since nanosecond epochs are beyond what an `f64`
/// represents exactly. Results from the future clamp to zero.
pub fn normalize(raw: &str, now: DateTime<Utc>) -> Result<u64, QueueTimeError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let start_ms = if cleaned.contains('.') {
        parse_fractional(&cleaned)
    } else {
        cleaned.parse::<i64>().ok().map(integer_to_millis)
    }
    .ok_or_else(|| QueueTimeError::NotParseable { raw: raw.to_owned() })?;

    let elapsed = now.timestamp_millis().saturating_sub(start_ms);
    Ok(elapsed.max(0) as u64)
}

// ─── Unit conversion ─────────────────────────────────────────────

fn integer_to_millis(value: i64) -> i64 {
    if value > NANOSECONDS_CUTOFF {
        // Nanoseconds (Render)
        value / 1_000_000
    } else if value > MICROSECONDS_CUTOFF {
        value / 1_000
    } else if value > MILLISECONDS_CUTOFF {
        // Milliseconds (Heroku)
        value
    } else {
        // Whole seconds
        value.saturating_mul(1_000)
    }
}

/// Fractional values, typically seconds from NGINX.
fn parse_fractional(cleaned: &str) -> Option<i64> {
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let ms = if value > NANOSECONDS_CUTOFF as f64 {
        value / 1_000_000.0
    } else if value > MICROSECONDS_CUTOFF as f64 {
        value / 1_000.0
    } else if value > MILLISECONDS_CUTOFF as f64 {
        value
    } else {
        value * 1_000.0
    };

    // `as` would saturate out-of-range values
    if !(i64::MIN as f64..i64::MAX as f64).contains(&ms) {
        return None;
    }
    Some(ms as i64)
}
