use duckdb::params;
use turnscope_core::error::{Result, TraceError};
use turnscope_core::ids::TraceKey;
use turnscope_core::model::span::Span;

use crate::CollectorDb;

impl CollectorDb {
    /// Appends spans the way the collector does; rows are never updated.
    pub fn insert_spans(&self, trace_key: &TraceKey, spans: &[Span]) -> Result<()> {
        if spans.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(|e| TraceError::Store(format!("begin tx failed: {e}")))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO spans
                     (seq, trace_key, id, span_id, parent_span_id, name, operation_type,
                      start_time_ns, end_time_ns, duration_ms, captured_at, status,
                      attributes_json, events_json)
                     VALUES (nextval('spans_seq'), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(|e| TraceError::Store(format!("prepare insert spans failed: {e}")))?;

            for span in spans {
                let attributes_json = serde_json::to_string(&span.attributes)
                    .map_err(|e| TraceError::Internal(format!("encode attributes failed: {e}")))?;
                let events_json = serde_json::to_string(&span.events)
                    .map_err(|e| TraceError::Internal(format!("encode events failed: {e}")))?;

                stmt.execute(params![
                    trace_key.as_str(),
                    span.id,
                    span.span_id,
                    span.parent_span_id,
                    span.name,
                    span.operation_type,
                    span.start_time_ns,
                    span.end_time_ns,
                    span.duration_ms,
                    span.captured_at.map(|ts| ts.to_rfc3339()),
                    span.status.map(|s| s.as_str()),
                    attributes_json,
                    events_json,
                ])
                .map_err(|e| TraceError::Store(format!("insert span failed: {e}")))?;
            }
        }

        tx.commit()
            .map_err(|e| TraceError::Store(format!("commit spans failed: {e}")))
    }
}
