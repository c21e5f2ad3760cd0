use serde::{Deserialize, Serialize};

use crate::ids::Cursor;
use crate::model::span::{FlatSpan, Span};
use crate::model::turn::ConversationTurn;
use crate::trace::view::TraceStats;

/// One page of spans from the upstream collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpanPage {
    pub spans: Vec<Span>,
    #[serde(default)]
    pub next_cursor: Option<Cursor>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpanCount {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TraceListItem {
    pub trace_key: String,
    pub span_count: usize,
    pub first_start_ns: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnsResponse {
    pub trace_key: String,
    pub turns: Vec<ConversationTurn>,
    pub stats: TraceStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatSpansResponse {
    pub trace_key: String,
    pub spans: Vec<FlatSpan>,
    pub stats: TraceStats,
}
