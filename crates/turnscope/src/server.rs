use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use turnscope_core::error::TraceError;
use turnscope_core::ids::{Cursor, TraceKey};
use turnscope_core::query::{
    FlatSpansResponse, SpanCount, SpanPage, TraceListItem, TurnsResponse,
};
use turnscope_core::trace::TraceView;
use turnscope_feed::{DuckDbSource, SessionController, SpanSource};

#[derive(Clone)]
pub struct QueryState {
    source: DuckDbSource,
    page_size: usize,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    limit: Option<usize>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

struct ApiError(TraceError);

impl From<TraceError> for ApiError {
    fn from(err: TraceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            TraceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "query request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(source: DuckDbSource, page_size: usize) -> Router {
    let state = QueryState {
        source,
        page_size: page_size.max(1),
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/v1/traces", get(list_traces))
        .route("/v1/traces/{key}/spans", get(span_page))
        .route("/v1/traces/{key}/spans/count", get(span_count))
        .route("/v1/traces/{key}/turns", get(turns))
        .route("/v1/traces/{key}/flat", get(flat_spans))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

pub async fn run_query_http_server(
    source: DuckDbSource,
    page_size: usize,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .context("bind query http listener")?;
    tracing::info!(%addr, "query http server listening");
    axum::serve(listener, router(source, page_size))
        .await
        .context("query http server failed")
}

async fn list_traces(
    State(state): State<QueryState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<TraceListItem>> {
    let db = state.source.db().clone();
    let limit = params.limit.unwrap_or(50);
    let items = tokio::task::spawn_blocking(move || db.list_traces(limit))
        .await
        .map_err(|e| TraceError::Internal(format!("list traces task failed: {e}")))??;
    Ok(Json(items))
}

async fn span_page(
    State(state): State<QueryState>,
    Path(key): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<SpanPage> {
    let key = TraceKey::parse(&key)?;
    let cursor = params.cursor.filter(|c| !c.is_empty()).map(Cursor::new);
    let limit = params.limit.unwrap_or(state.page_size);
    let page = state
        .source
        .fetch_span_page(&key, cursor.as_ref(), limit)
        .await?;
    Ok(Json(page))
}

async fn span_count(
    State(state): State<QueryState>,
    Path(key): Path<String>,
) -> ApiResult<SpanCount> {
    let key = TraceKey::parse(&key)?;
    let count = state.source.fetch_span_count(&key).await?;
    Ok(Json(SpanCount { count }))
}

async fn turns(
    State(state): State<QueryState>,
    Path(key): Path<String>,
) -> ApiResult<TurnsResponse> {
    let key = TraceKey::parse(&key)?;
    let view = load_view(&state, key.clone()).await?;
    Ok(Json(TurnsResponse {
        trace_key: key.to_string(),
        turns: view.turns.clone(),
        stats: view.stats.clone(),
    }))
}

async fn flat_spans(
    State(state): State<QueryState>,
    Path(key): Path<String>,
) -> ApiResult<FlatSpansResponse> {
    let key = TraceKey::parse(&key)?;
    let view = load_view(&state, key.clone()).await?;
    Ok(Json(FlatSpansResponse {
        trace_key: key.to_string(),
        spans: view.flat_spans.clone(),
        stats: view.stats.clone(),
    }))
}

/// Drains the trace through a fresh session so the server sees exactly what
/// a paging viewer would.
async fn load_view(state: &QueryState, key: TraceKey) -> Result<Arc<TraceView>, ApiError> {
    let session = SessionController::new(Arc::new(state.source.clone()), state.page_size);
    session.open(key);
    session.load_all().await?;
    Ok(session.view())
}
