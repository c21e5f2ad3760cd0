use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Semaphore;
use turnscope_core::error::{Result, TraceError};
use turnscope_core::ids::{Cursor, TraceKey};
use turnscope_core::model::span::{Span, SpanStatus};
use turnscope_core::query::SpanPage;
use turnscope_core::time::datetime_to_ns;
use turnscope_feed::SpanSource;
use turnscope_store::CollectorDb;

pub fn base_time_ns() -> i64 {
    let base = Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap();
    datetime_to_ns(&base)
}

/// A span `offset_ms` after [`base_time_ns`]. `id` is the storage id and is
/// derived from the trace key so that it differs from `span_id`.
pub fn span(
    trace_key: &str,
    span_id: &str,
    name: &str,
    parent: Option<&str>,
    offset_ms: i64,
    duration_ms: Option<f64>,
) -> Span {
    let start = base_time_ns() + offset_ms * 1_000_000;
    let end = duration_ms.map(|d| start + (d * 1_000_000.0) as i64);
    let operation_type = match name {
        "llm" | "tts" | "stt" | "tool" => name,
        _ => "general",
    };
    Span {
        id: format!("{trace_key}:{span_id}"),
        span_id: span_id.to_string(),
        parent_span_id: parent.map(str::to_string),
        name: name.to_string(),
        operation_type: operation_type.to_string(),
        start_time_ns: Some(start),
        end_time_ns: end,
        duration_ms,
        captured_at: None,
        status: Some(SpanStatus::Ok),
        attributes: serde_json::json!({ "session.id": trace_key }),
        events: serde_json::json!([]),
    }
}

/// A short voice-agent call: session start, a user turn with transcription,
/// an assistant turn with a model call, a failing tool call and speech, a
/// second user turn and the session drain.
pub fn sample_session(trace_key: &str) -> Vec<Span> {
    let mut tool = span(trace_key, "7", "tool", Some("5"), 140, Some(40.0));
    tool.status = Some(SpanStatus::Error);
    tool.attributes = serde_json::json!({
        "session.id": trace_key,
        "tool.name": "lookup_order",
        "error.message": "order service timed out",
    });

    let mut llm = span(trace_key, "5", "llm", Some("4"), 21, Some(500.0));
    llm.attributes = serde_json::json!({
        "session.id": trace_key,
        "llm.model": "gpt-4o-mini",
        "llm.tokens.prompt": 812,
        "llm.tokens.completion": 64,
    });

    vec![
        span(trace_key, "1", "start_agent_activity", None, 0, Some(2.0)),
        span(trace_key, "2", "user_turn", None, 10, None),
        span(trace_key, "3", "stt", Some("2"), 11, Some(320.0)),
        span(trace_key, "4", "assistant_turn", None, 20, None),
        llm,
        tool,
        span(trace_key, "6", "tts", Some("4"), 530, Some(180.0)),
        span(trace_key, "8", "user_turn", None, 2_000, None),
        span(trace_key, "9", "stt", Some("8"), 2_001, Some(410.0)),
        span(trace_key, "10", "drain_agent_activity", None, 3_000, Some(5.0)),
    ]
}

/// Writes `spans` into the collector table the way the upstream collector would.
pub fn seed_collector(db: &CollectorDb, trace_key: &str, spans: &[Span]) -> anyhow::Result<()> {
    let key = TraceKey::parse(trace_key)?;
    db.insert_spans(&key, spans)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub trace_key: String,
    pub cursor: Option<String>,
    pub page_size: usize,
}

/// In-memory [`SpanSource`] with offset cursors.
///
/// Pages are served in insertion order, so tests control which spans arrive
/// together. Every request is recorded before any delay or gate applies, which
/// lets a test observe a fetch that is still in flight.
#[derive(Default)]
pub struct ScriptedSource {
    traces: Mutex<HashMap<String, Vec<Span>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
    failures: AtomicUsize,
    reported_count: Option<u64>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(self, trace_key: &str, spans: Vec<Span>) -> Self {
        self.push_spans(trace_key, spans);
        self
    }

    /// Each page fetch waits for one permit on `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Overrides what `fetch_span_count` answers.
    pub fn with_reported_count(mut self, count: u64) -> Self {
        self.reported_count = Some(count);
        self
    }

    /// Appends spans to a trace, as a collector would while a call is live.
    pub fn push_spans(&self, trace_key: &str, spans: Vec<Span>) {
        self.traces
            .lock()
            .unwrap()
            .entry(trace_key.to_string())
            .or_default()
            .extend(spans);
    }

    /// The next `n` page fetches fail with a source error.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Polls until at least `n` page requests were issued.
    pub async fn wait_for_requests(&self, n: usize) {
        for _ in 0..400 {
            if self.requests.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {n} page requests");
    }
}

#[async_trait]
impl SpanSource for ScriptedSource {
    async fn fetch_span_page(
        &self,
        trace_key: &TraceKey,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<SpanPage> {
        self.requests.lock().unwrap().push(RecordedRequest {
            trace_key: trace_key.to_string(),
            cursor: cursor.map(|c| c.as_str().to_string()),
            page_size,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| TraceError::Internal(e.to_string()))?
                .forget();
        }
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(TraceError::Source("scripted failure".to_string()));
        }

        let offset = match cursor {
            Some(cursor) => cursor
                .as_str()
                .parse::<usize>()
                .map_err(|_| TraceError::InvalidArgument(format!("bad cursor {cursor}")))?,
            None => 0,
        };
        let traces = self.traces.lock().unwrap();
        let spans = traces.get(trace_key.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let start = offset.min(spans.len());
        let end = (start + page_size).min(spans.len());
        let next_cursor = (end < spans.len()).then(|| Cursor::new(end.to_string()));
        Ok(SpanPage {
            spans: spans[start..end].to_vec(),
            next_cursor,
        })
    }

    async fn fetch_span_count(&self, trace_key: &TraceKey) -> Result<u64> {
        if let Some(count) = self.reported_count {
            return Ok(count);
        }
        let traces = self.traces.lock().unwrap();
        Ok(traces.get(trace_key.as_str()).map_or(0, |s| s.len() as u64))
    }
}
