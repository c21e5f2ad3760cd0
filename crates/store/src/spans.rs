use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;
use turnscope_core::ids::TraceKey;
use turnscope_core::model::span::Span;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.added += other.added;
        self.duplicates += other.duplicates;
        self.malformed += other.malformed;
    }
}

/// Cumulative span collection for one trace.
///
/// Spans are only ever added. A span whose `id` was already seen is ignored,
/// and a span without `startTimeNs` is dropped because it cannot be ordered.
/// The collection is kept sorted by `(startTimeNs, id)`.
#[derive(Debug, Clone)]
pub struct SpanStore {
    trace_key: TraceKey,
    spans: Vec<Span>,
    seen: HashSet<String>,
}

impl SpanStore {
    pub fn new(trace_key: TraceKey) -> Self {
        Self {
            trace_key,
            spans: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn trace_key(&self) -> &TraceKey {
        &self.trace_key
    }

    pub fn ingest(&mut self, page: Vec<Span>) -> IngestReport {
        let mut report = IngestReport::default();

        for span in page {
            if span.start_time_ns.is_none() {
                warn!(
                    trace_key = %self.trace_key,
                    id = %span.id,
                    span_id = %span.span_id,
                    "dropping span without startTimeNs"
                );
                report.malformed += 1;
                continue;
            }
            if !self.seen.insert(span.id.clone()) {
                report.duplicates += 1;
                continue;
            }
            self.spans.push(span);
            report.added += 1;
        }

        if report.added > 0 {
            self.spans.sort_by(|a, b| {
                a.start_time_ns
                    .cmp(&b.start_time_ns)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        report
    }

    pub fn snapshot(&self) -> Vec<Span> {
        self.spans.clone()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
