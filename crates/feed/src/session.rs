use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use turnscope_core::error::Result;
use turnscope_core::ids::TraceKey;
use turnscope_core::model::span::FlatSpan;
use turnscope_core::model::turn::ConversationTurn;
use turnscope_core::trace::{TraceView, recompute};
use turnscope_store::SpanStore;

use crate::driver::PaginationDriver;
use crate::source::SpanSource;

const SELECTION_CHANNEL_CAPACITY: usize = 64;
const COALESCED_RETRY: Duration = Duration::from_millis(10);
const MIN_AUTOLOAD_INTERVAL: Duration = Duration::from_millis(1);
/// Consecutive failed fetches after which autoload gives up.
pub const MAX_AUTOLOAD_FAILURES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    NoData,
    Partial,
    AllLoaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded { added: usize, total: usize },
    /// Another fetch for this trace was already outstanding.
    Coalesced,
    /// The trace changed while the page was in flight.
    Stale,
    AllLoaded,
    NoTrace,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub trace_key: Option<String>,
    pub state: LoadState,
    pub loaded: usize,
    pub total_hint: Option<u64>,
    pub pages_fetched: usize,
}

struct ActiveTrace {
    generation: u64,
    store: SpanStore,
    driver: PaginationDriver,
    in_flight: bool,
    view: Arc<TraceView>,
    total_hint: Option<u64>,
}

impl ActiveTrace {
    fn load_state(&self) -> LoadState {
        if self.store.is_empty() {
            LoadState::NoData
        } else if self.driver.is_done() {
            LoadState::AllLoaded
        } else {
            LoadState::Partial
        }
    }
}

#[derive(Default)]
struct Inner {
    generation: u64,
    active: Option<ActiveTrace>,
}

/// Frees the in-flight slot when a page fetch is dropped before it resumes.
struct InFlightSlot {
    inner: Arc<Mutex<Inner>>,
    generation: u64,
    armed: bool,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if let Some(active) = inner
            .active
            .as_mut()
            .filter(|active| active.generation == self.generation)
        {
            debug!(trace_key = %active.store.trace_key(), "page fetch cancelled");
            active.in_flight = false;
        }
    }
}

/// Owns the span store of the trace being viewed and feeds it from a source.
///
/// At most one page fetch is outstanding per trace. A `load_more` issued
/// while one is running is coalesced, and a page that arrives after the trace
/// was switched or closed is dropped. Every successful ingest rebuilds the
/// derived view from the full snapshot.
#[derive(Clone)]
pub struct SessionController {
    source: Arc<dyn SpanSource>,
    page_size: usize,
    inner: Arc<Mutex<Inner>>,
    selection: broadcast::Sender<FlatSpan>,
}

impl SessionController {
    pub fn new(source: Arc<dyn SpanSource>, page_size: usize) -> Self {
        let (selection, _) = broadcast::channel(SELECTION_CHANNEL_CAPACITY);
        Self {
            source,
            page_size: page_size.max(1),
            inner: Arc::new(Mutex::new(Inner::default())),
            selection,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("session mutex poisoned")
    }

    /// Starts viewing `trace_key` with an empty store. Any previous trace is
    /// discarded along with whatever it still had in flight.
    pub fn open(&self, trace_key: TraceKey) {
        let mut inner = self.lock();
        inner.generation += 1;
        info!(trace_key = %trace_key, generation = inner.generation, "opening trace");
        inner.active = Some(ActiveTrace {
            generation: inner.generation,
            store: SpanStore::new(trace_key.clone()),
            driver: PaginationDriver::new(trace_key, self.page_size),
            in_flight: false,
            view: Arc::new(TraceView::default()),
            total_hint: None,
        });
    }

    pub fn close(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        if let Some(active) = inner.active.take() {
            debug!(trace_key = %active.store.trace_key(), "closing trace");
        }
    }

    pub fn trace_key(&self) -> Option<TraceKey> {
        self.lock()
            .active
            .as_ref()
            .map(|active| active.store.trace_key().clone())
    }

    fn active_generation(&self) -> Option<u64> {
        self.lock().active.as_ref().map(|active| active.generation)
    }

    pub async fn load_more(&self) -> Result<FetchOutcome> {
        let (generation, request) = {
            let mut inner = self.lock();
            let Some(active) = inner.active.as_mut() else {
                return Ok(FetchOutcome::NoTrace);
            };
            if active.in_flight {
                debug!(trace_key = %active.store.trace_key(), "page fetch already in flight");
                return Ok(FetchOutcome::Coalesced);
            }
            let Some(request) = active.driver.next_request() else {
                return Ok(FetchOutcome::AllLoaded);
            };
            active.in_flight = true;
            (active.generation, request)
        };
        let mut slot = InFlightSlot {
            inner: Arc::clone(&self.inner),
            generation,
            armed: true,
        };

        let result = self
            .source
            .fetch_span_page(&request.trace_key, request.cursor.as_ref(), request.page_size)
            .await;

        let mut inner = self.lock();
        slot.armed = false;
        let Some(active) = inner
            .active
            .as_mut()
            .filter(|active| active.generation == generation)
        else {
            debug!(trace_key = %request.trace_key, "discarding stale span page");
            return Ok(FetchOutcome::Stale);
        };
        active.in_flight = false;
        let page = result?;

        active.driver.advance(&page);
        let report = active.store.ingest(page.spans);
        if report.added > 0 {
            active.view = Arc::new(recompute(active.store.snapshot()));
        }
        debug!(
            trace_key = %request.trace_key,
            cursor = ?request.cursor,
            added = report.added,
            duplicates = report.duplicates,
            malformed = report.malformed,
            total = active.store.len(),
            "ingested span page"
        );
        Ok(FetchOutcome::Loaded {
            added: report.added,
            total: active.store.len(),
        })
    }

    /// Keeps fetching until the driver reports the trace exhausted.
    pub async fn load_all(&self) -> Result<LoadState> {
        loop {
            match self.load_more().await? {
                FetchOutcome::Loaded { .. } => {}
                FetchOutcome::Coalesced => tokio::time::sleep(COALESCED_RETRY).await,
                FetchOutcome::AllLoaded | FetchOutcome::Stale | FetchOutcome::NoTrace => break,
            }
        }
        Ok(self.load_state())
    }

    /// Asks the source for its span count. The number is only a progress hint.
    pub async fn refresh_count(&self) -> Result<Option<u64>> {
        let (generation, trace_key) = {
            let inner = self.lock();
            let Some(active) = inner.active.as_ref() else {
                return Ok(None);
            };
            (active.generation, active.store.trace_key().clone())
        };

        let count = self.source.fetch_span_count(&trace_key).await?;

        let mut inner = self.lock();
        let Some(active) = inner
            .active
            .as_mut()
            .filter(|active| active.generation == generation)
        else {
            return Ok(None);
        };
        if active.driver.is_done() && count != active.store.len() as u64 {
            debug!(
                trace_key = %trace_key,
                reported = count,
                loaded = active.store.len(),
                "span count disagrees with loaded spans"
            );
        }
        active.total_hint = Some(count);
        Ok(Some(count))
    }

    pub fn view(&self) -> Arc<TraceView> {
        self.lock()
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.view))
            .unwrap_or_default()
    }

    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.view().turns.clone()
    }

    pub fn flat_spans(&self) -> Vec<FlatSpan> {
        self.view().flat_spans.clone()
    }

    pub fn load_state(&self) -> LoadState {
        self.lock()
            .active
            .as_ref()
            .map_or(LoadState::NoData, ActiveTrace::load_state)
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.lock();
        match inner.active.as_ref() {
            Some(active) => SessionStatus {
                trace_key: Some(active.store.trace_key().to_string()),
                state: active.load_state(),
                loaded: active.store.len(),
                total_hint: active.total_hint,
                pages_fetched: active.driver.pages_fetched(),
            },
            None => SessionStatus {
                trace_key: None,
                state: LoadState::NoData,
                loaded: 0,
                total_hint: None,
                pages_fetched: 0,
            },
        }
    }

    /// Looks the span up in the current view and hands it to subscribers.
    pub fn select_span(&self, span_id: &str) -> Option<FlatSpan> {
        let selected = self.view().find(span_id).cloned()?;
        // No subscribers is fine.
        let _ = self.selection.send(selected.clone());
        Some(selected)
    }

    pub fn subscribe_selection(&self) -> broadcast::Receiver<FlatSpan> {
        self.selection.subscribe()
    }

    /// Fetches one page per tick for the trace open right now. The task ends
    /// when every page is in, when the trace is switched or closed, or with
    /// the last error once `MAX_AUTOLOAD_FAILURES` fetches in a row failed.
    pub fn spawn_autoload(&self, interval: Duration) -> JoinHandle<Result<()>> {
        let controller = self.clone();
        tokio::spawn(async move {
            let Some(generation) = controller.active_generation() else {
                return Ok(());
            };
            let mut ticker = tokio::time::interval(interval.max(MIN_AUTOLOAD_INTERVAL));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut failures = 0;
            loop {
                ticker.tick().await;
                if controller.active_generation() != Some(generation) {
                    debug!(generation, "trace changed; stopping autoload");
                    return Ok(());
                }
                match controller.load_more().await {
                    Ok(FetchOutcome::Loaded { added, total }) => {
                        failures = 0;
                        debug!(added, total, "autoload fetched a page");
                    }
                    Ok(FetchOutcome::Coalesced) => {}
                    Ok(FetchOutcome::AllLoaded | FetchOutcome::Stale | FetchOutcome::NoTrace) => {
                        return Ok(());
                    }
                    Err(err) => {
                        failures += 1;
                        warn!(error = %err, failures, "autoload page fetch failed");
                        if failures >= MAX_AUTOLOAD_FAILURES {
                            return Err(err);
                        }
                    }
                }
            }
        })
    }
}
