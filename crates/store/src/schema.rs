/// Span table as written by the upstream collector. `seq` is the ingestion
/// order and doubles as the pagination column.
pub const SCHEMA_SQL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS spans_seq START 1;

CREATE TABLE IF NOT EXISTS spans (
  seq BIGINT PRIMARY KEY,
  trace_key TEXT NOT NULL,
  id TEXT NOT NULL,
  span_id TEXT NOT NULL,
  parent_span_id TEXT,
  name TEXT NOT NULL,
  operation_type TEXT NOT NULL,
  start_time_ns BIGINT,
  end_time_ns BIGINT,
  duration_ms DOUBLE,
  captured_at TIMESTAMP,
  status TEXT,
  attributes_json TEXT NOT NULL,
  events_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_spans_trace_seq ON spans(trace_key, seq);
"#;
