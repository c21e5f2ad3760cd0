use chrono::NaiveDateTime;
use duckdb::params;
use turnscope_core::error::{Result, TraceError};
use turnscope_core::ids::{Cursor, TraceKey};
use turnscope_core::model::span::{Span, SpanStatus};
use turnscope_core::query::{SpanPage, TraceListItem};

use crate::CollectorDb;

const SPAN_COLUMNS: &str = "seq, id, span_id, parent_span_id, name, operation_type, \
     start_time_ns, end_time_ns, duration_ms, captured_at, status, attributes_json, events_json";

impl CollectorDb {
    /// Keyset pagination over `seq`. The returned cursor is the last `seq`
    /// seen; it is absent once a page comes back shorter than `limit`.
    pub fn fetch_span_page(
        &self,
        trace_key: &TraceKey,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<SpanPage> {
        if limit == 0 {
            return Err(TraceError::InvalidArgument(
                "page size must be at least 1".to_string(),
            ));
        }
        let after = cursor.map(parse_cursor).transpose()?.unwrap_or(0);

        let conn = self.conn();
        let sql = format!(
            "SELECT {SPAN_COLUMNS}
             FROM spans
             WHERE trace_key = ? AND seq > ?
             ORDER BY seq ASC
             LIMIT ?"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TraceError::Store(format!("prepare span page failed: {e}")))?;

        let rows = stmt
            .query_map(params![trace_key.as_str(), after, limit as i64], |row| {
                let seq = row.get::<_, i64>(0)?;
                let span = Span {
                    id: row.get::<_, String>(1)?,
                    span_id: row.get::<_, String>(2)?,
                    parent_span_id: row.get::<_, Option<String>>(3)?,
                    name: row.get::<_, String>(4)?,
                    operation_type: row.get::<_, String>(5)?,
                    start_time_ns: row.get::<_, Option<i64>>(6)?,
                    end_time_ns: row.get::<_, Option<i64>>(7)?,
                    duration_ms: row.get::<_, Option<f64>>(8)?,
                    captured_at: row
                        .get::<_, Option<NaiveDateTime>>(9)?
                        .map(|dt| dt.and_utc()),
                    status: row
                        .get::<_, Option<String>>(10)?
                        .as_deref()
                        .and_then(SpanStatus::parse),
                    attributes: parse_blob(row.get::<_, String>(11)?),
                    events: parse_blob(row.get::<_, String>(12)?),
                };
                Ok((seq, span))
            })
            .map_err(|e| TraceError::Store(format!("query span page failed: {e}")))?;

        let mut spans = Vec::new();
        let mut last_seq = None;
        for row in rows {
            let (seq, span) =
                row.map_err(|e| TraceError::Store(format!("map span row failed: {e}")))?;
            last_seq = Some(seq);
            spans.push(span);
        }

        let next_cursor = if spans.len() == limit {
            last_seq.map(|seq| Cursor::new(seq.to_string()))
        } else {
            None
        };

        Ok(SpanPage { spans, next_cursor })
    }

    pub fn fetch_span_count(&self, trace_key: &TraceKey) -> Result<u64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM spans WHERE trace_key = ?",
            params![trace_key.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .map(|v| v.max(0) as u64)
        .map_err(|e| TraceError::Store(format!("count spans failed: {e}")))
    }

    /// Most recently written traces first.
    pub fn list_traces(&self, limit: usize) -> Result<Vec<TraceListItem>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT trace_key, COUNT(*) AS span_count, MIN(start_time_ns) AS first_start
                 FROM spans
                 GROUP BY trace_key
                 ORDER BY MAX(seq) DESC
                 LIMIT ?",
            )
            .map_err(|e| TraceError::Store(format!("prepare traces failed: {e}")))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(TraceListItem {
                    trace_key: row.get::<_, String>(0)?,
                    span_count: row.get::<_, i64>(1)? as usize,
                    first_start_ns: row.get::<_, Option<i64>>(2)?,
                })
            })
            .map_err(|e| TraceError::Store(format!("query traces failed: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| TraceError::Store(format!("map traces row failed: {e}")))?);
        }
        Ok(out)
    }
}

fn parse_cursor(cursor: &Cursor) -> Result<i64> {
    cursor
        .as_str()
        .parse::<i64>()
        .map_err(|_| TraceError::InvalidArgument(format!("invalid cursor: {cursor}")))
}

// Blobs are opaque; keep unparseable text verbatim instead of failing the page.
fn parse_blob(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use turnscope_core::ids::{Cursor, TraceKey};
    use turnscope_core::model::span::{Span, SpanStatus};

    use crate::CollectorDb;

    fn span(id: &str, start: Option<i64>) -> Span {
        Span {
            id: id.to_string(),
            span_id: format!("s{id}"),
            parent_span_id: None,
            name: "llm".to_string(),
            operation_type: "llm".to_string(),
            start_time_ns: start,
            end_time_ns: None,
            duration_ms: None,
            captured_at: None,
            status: None,
            attributes: serde_json::json!({}),
            events: serde_json::json!([]),
        }
    }

    fn key(k: &str) -> TraceKey {
        TraceKey::parse(k).unwrap()
    }

    #[test]
    fn pages_through_a_trace_in_write_order() {
        let db = CollectorDb::open_in_memory().unwrap();
        let spans = (0..5)
            .map(|i| span(&i.to_string(), Some(i)))
            .collect::<Vec<_>>();
        db.insert_spans(&key("t1"), &spans).unwrap();
        db.insert_spans(&key("t2"), &[span("other", Some(0))]).unwrap();

        let first = db.fetch_span_page(&key("t1"), None, 2).unwrap();
        assert_eq!(first.spans.len(), 2);
        let cursor = first.next_cursor.clone().unwrap();

        let second = db.fetch_span_page(&key("t1"), Some(&cursor), 2).unwrap();
        assert_eq!(second.spans[0].id, "2");
        let cursor = second.next_cursor.clone().unwrap();

        let third = db.fetch_span_page(&key("t1"), Some(&cursor), 2).unwrap();
        assert_eq!(third.spans.len(), 1);
        assert!(third.next_cursor.is_none());
    }

    #[test]
    fn round_trips_every_span_field() {
        let db = CollectorDb::open_in_memory().unwrap();
        let mut s = span("x", Some(1_700_000_000_000_000_000));
        s.parent_span_id = Some("parent".to_string());
        s.end_time_ns = Some(1_700_000_000_500_000_000);
        s.duration_ms = Some(500.0);
        s.captured_at = Some(chrono::Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        s.status = Some(SpanStatus::Error);
        s.attributes = serde_json::json!({"model": "gpt-4o", "cost": 0.01});
        s.events = serde_json::json!([{"name": "first_token"}]);
        db.insert_spans(&key("t1"), std::slice::from_ref(&s)).unwrap();

        let page = db.fetch_span_page(&key("t1"), None, 10).unwrap();
        assert_eq!(page.spans, vec![s]);
    }

    #[test]
    fn spans_without_start_time_are_still_served() {
        let db = CollectorDb::open_in_memory().unwrap();
        db.insert_spans(&key("t1"), &[span("1", None)]).unwrap();
        let page = db.fetch_span_page(&key("t1"), None, 10).unwrap();
        assert_eq!(page.spans[0].start_time_ns, None);
    }

    #[test]
    fn rejects_bad_cursor_and_zero_limit() {
        let db = CollectorDb::open_in_memory().unwrap();
        assert!(
            db.fetch_span_page(&key("t1"), Some(&Cursor::new("nope")), 10)
                .is_err()
        );
        assert!(db.fetch_span_page(&key("t1"), None, 0).is_err());
    }

    #[test]
    fn counts_and_lists_traces() {
        let db = CollectorDb::open_in_memory().unwrap();
        db.insert_spans(&key("old"), &[span("1", Some(5))]).unwrap();
        db.insert_spans(&key("new"), &[span("2", Some(7)), span("3", Some(3))])
            .unwrap();

        assert_eq!(db.fetch_span_count(&key("new")).unwrap(), 2);
        assert_eq!(db.fetch_span_count(&key("missing")).unwrap(), 0);

        let traces = db.list_traces(10).unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].trace_key, "new");
        assert_eq!(traces[0].span_count, 2);
        assert_eq!(traces[0].first_start_ns, Some(3));
    }
}
