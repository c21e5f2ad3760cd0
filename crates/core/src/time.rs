use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Result, TraceError};

pub fn ns_to_datetime(ns: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(ns)
}

/// Nanoseconds since the epoch, saturating outside the representable range
/// (roughly years 1677..2262).
pub fn datetime_to_ns(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or_else(|| {
        if ts.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}

pub fn format_duration_ms(ms: f64) -> String {
    if !ms.is_finite() || ms <= 0.0 {
        return "0ms".to_string();
    }
    if ms < 1_000.0 {
        return format!("{}ms", ms.round() as i64);
    }
    if ms < 60_000.0 {
        return format!("{:.2}s", ms / 1_000.0);
    }
    let total_secs = (ms / 1_000.0).floor() as i64;
    format!("{}m{:02}s", total_secs / 60, total_secs % 60)
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| TraceError::Parse(format!("invalid duration {input}: {e}")))
}
