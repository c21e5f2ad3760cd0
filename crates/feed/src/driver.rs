use serde::Serialize;
use tracing::{debug, warn};
use turnscope_core::error::Result;
use turnscope_core::ids::{Cursor, TraceKey};
use turnscope_core::query::SpanPage;
use turnscope_store::{IngestReport, SpanStore};

use crate::source::SpanSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Ready,
    AllLoaded,
}

/// The next page the driver wants, detached from the driver so the caller can
/// release any lock it holds while the fetch is outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub trace_key: TraceKey,
    pub cursor: Option<Cursor>,
    pub page_size: usize,
}

#[derive(Debug)]
pub enum Step {
    Page(SpanPage),
    Done,
}

/// Pull-based cursor iterator over one trace.
///
/// The driver is done once a page comes back without a `next_cursor` or with
/// fewer spans than were asked for. Either signal is enough.
#[derive(Debug, Clone)]
pub struct PaginationDriver {
    trace_key: TraceKey,
    page_size: usize,
    cursor: Option<Cursor>,
    state: DriverState,
    pages_fetched: usize,
    spans_received: usize,
}

impl PaginationDriver {
    pub fn new(trace_key: TraceKey, page_size: usize) -> Self {
        Self {
            trace_key,
            page_size: page_size.max(1),
            cursor: None,
            state: DriverState::Ready,
            pages_fetched: 0,
            spans_received: 0,
        }
    }

    pub fn trace_key(&self) -> &TraceKey {
        &self.trace_key
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == DriverState::AllLoaded
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn spans_received(&self) -> usize {
        self.spans_received
    }

    pub fn next_request(&self) -> Option<PageRequest> {
        if self.is_done() {
            return None;
        }
        Some(PageRequest {
            trace_key: self.trace_key.clone(),
            cursor: self.cursor.clone(),
            page_size: self.page_size,
        })
    }

    /// Records a page fetched for the current request.
    pub fn advance(&mut self, page: &SpanPage) {
        self.pages_fetched += 1;
        self.spans_received += page.spans.len();

        let short = page.spans.len() < self.page_size;
        match &page.next_cursor {
            Some(next) if !short => {
                if self.cursor.as_ref() == Some(next) {
                    // A cursor that does not move would page forever.
                    warn!(
                        trace_key = %self.trace_key,
                        cursor = %next,
                        "source returned the same cursor twice; stopping pagination"
                    );
                    self.state = DriverState::AllLoaded;
                } else {
                    self.cursor = Some(next.clone());
                }
            }
            _ => {
                debug!(
                    trace_key = %self.trace_key,
                    pages = self.pages_fetched,
                    spans = self.spans_received,
                    "all pages loaded"
                );
                self.state = DriverState::AllLoaded;
            }
        }
    }

    pub async fn next(&mut self, source: &dyn SpanSource) -> Result<Step> {
        let Some(request) = self.next_request() else {
            return Ok(Step::Done);
        };
        let page = source
            .fetch_span_page(&request.trace_key, request.cursor.as_ref(), request.page_size)
            .await?;
        self.advance(&page);
        Ok(Step::Page(page))
    }

    /// Pulls every remaining page into `store`.
    pub async fn drain(
        &mut self,
        source: &dyn SpanSource,
        store: &mut SpanStore,
    ) -> Result<IngestReport> {
        let mut total = IngestReport::default();
        while let Step::Page(page) = self.next(source).await? {
            total.merge(store.ingest(page.spans));
        }
        Ok(total)
    }
}
