use async_trait::async_trait;
use turnscope_core::error::Result;
use turnscope_core::ids::{Cursor, TraceKey};
use turnscope_core::query::SpanPage;

/// Upstream collaborator that serves the spans of a trace page by page.
///
/// A page shorter than `page_size`, or one without a `next_cursor`, means the
/// trace is exhausted. `fetch_span_count` is advisory and may disagree with
/// what paging eventually returns.
#[async_trait]
pub trait SpanSource: Send + Sync {
    async fn fetch_span_page(
        &self,
        trace_key: &TraceKey,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<SpanPage>;

    async fn fetch_span_count(&self, trace_key: &TraceKey) -> Result<u64>;
}
