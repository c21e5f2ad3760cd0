use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::datetime_to_ns;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[serde(alias = "UNSET", alias = "Unset")]
    Unset,
    #[serde(alias = "OK", alias = "Ok")]
    Ok,
    #[serde(alias = "ERROR", alias = "Error")]
    Error,
}

impl SpanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.to_ascii_lowercase().as_str() {
            "unset" => Some(Self::Unset),
            "ok" => Some(Self::Ok),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One telemetry record as delivered by the upstream collector.
///
/// Spans are immutable once received. `attributes` and `events` are carried
/// through untouched so a span survives ingest and display without loss.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub operation_type: String,
    #[serde(default)]
    pub start_time_ns: Option<i64>,
    #[serde(default)]
    pub end_time_ns: Option<i64>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<SpanStatus>,
    #[serde(default)]
    pub attributes: serde_json::Value,
    #[serde(default)]
    pub events: serde_json::Value,
}

impl Span {
    /// The parent link, with empty strings treated as absent.
    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref().filter(|p| !p.is_empty())
    }

    /// Chronological key used for ordering siblings: `capturedAt` when present,
    /// otherwise `startTimeNs`.
    pub fn order_key(&self) -> i64 {
        self.captured_at
            .as_ref()
            .map(datetime_to_ns)
            .or(self.start_time_ns)
            .unwrap_or(0)
    }

    pub fn effective_duration_ms(&self) -> f64 {
        self.duration_ms.filter(|d| d.is_finite()).unwrap_or(0.0)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, Some(SpanStatus::Error))
    }
}

/// A span placed in the reconstructed tree, in display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlatSpan {
    #[serde(flatten)]
    pub span: Span,
    pub level: u32,
    pub child_count: usize,
}
