use std::path::Path;

use async_trait::async_trait;
use turnscope_core::error::{Result, TraceError};
use turnscope_core::ids::{Cursor, TraceKey};
use turnscope_core::query::SpanPage;
use turnscope_store::CollectorDb;

use crate::source::SpanSource;

/// Reads pages straight from a collector DuckDB file. Queries run on the
/// blocking pool so the caller's runtime is never stalled.
#[derive(Clone)]
pub struct DuckDbSource {
    db: CollectorDb,
}

impl DuckDbSource {
    pub fn new(db: CollectorDb) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(CollectorDb::open(path)?))
    }

    pub fn db(&self) -> &CollectorDb {
        &self.db
    }
}

#[async_trait]
impl SpanSource for DuckDbSource {
    async fn fetch_span_page(
        &self,
        trace_key: &TraceKey,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<SpanPage> {
        let db = self.db.clone();
        let trace_key = trace_key.clone();
        let cursor = cursor.cloned();
        tokio::task::spawn_blocking(move || {
            db.fetch_span_page(&trace_key, cursor.as_ref(), page_size)
        })
        .await
        .map_err(|e| TraceError::Internal(format!("span page task failed: {e}")))?
    }

    async fn fetch_span_count(&self, trace_key: &TraceKey) -> Result<u64> {
        let db = self.db.clone();
        let trace_key = trace_key.clone();
        tokio::task::spawn_blocking(move || db.fetch_span_count(&trace_key))
            .await
            .map_err(|e| TraceError::Internal(format!("span count task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use turnscope_core::model::span::Span;

    use super::*;

    fn span(id: &str, start: i64) -> Span {
        Span {
            id: id.to_string(),
            span_id: id.to_string(),
            parent_span_id: None,
            name: "llm".to_string(),
            operation_type: "llm".to_string(),
            start_time_ns: Some(start),
            end_time_ns: None,
            duration_ms: None,
            captured_at: None,
            status: None,
            attributes: serde_json::json!({}),
            events: serde_json::json!([]),
        }
    }

    #[tokio::test]
    async fn serves_pages_and_counts_from_duckdb() {
        let db = CollectorDb::open_in_memory().unwrap();
        let key = TraceKey::parse("call-7").unwrap();
        db.insert_spans(&key, &[span("a", 1), span("b", 2), span("c", 3)])
            .unwrap();
        let source = DuckDbSource::new(db);

        let page = source.fetch_span_page(&key, None, 2).await.unwrap();
        assert_eq!(page.spans.len(), 2);
        let rest = source
            .fetch_span_page(&key, page.next_cursor.as_ref(), 2)
            .await
            .unwrap();
        assert_eq!(rest.spans.len(), 1);
        assert_eq!(source.fetch_span_count(&key).await.unwrap(), 3);
    }
}
