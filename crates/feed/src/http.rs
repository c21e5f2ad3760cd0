use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;
use turnscope_core::error::{Result, TraceError};
use turnscope_core::ids::{Cursor, TraceKey};
use turnscope_core::query::{SpanCount, SpanPage};

use crate::source::SpanSource;

/// Talks to a remote collector (or a `turnscope serve` instance) over HTTP.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(TraceError::InvalidArgument(
                "remote url must not be empty".to_string(),
            ));
        }
        let base_url = Url::parse(trimmed)
            .map_err(|e| TraceError::InvalidArgument(format!("bad remote url {trimmed}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TraceError::InvalidArgument(format!(
                "remote url cannot carry a path: {trimmed}"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TraceError::Source(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// `{base}/v1/traces/{key}/spans/{tail..}` with every segment percent-encoded.
    fn spans_url(&self, trace_key: &TraceKey, tail: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                TraceError::InvalidArgument(format!(
                    "remote url cannot carry a path: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["v1", "traces", trace_key.as_str(), "spans"])
            .extend(tail);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| TraceError::Source(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TraceError::Source(format!(
                "{url} returned {status}: {}",
                body.trim()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| TraceError::Parse(format!("invalid response from {url}: {e}")))
    }
}

#[async_trait]
impl SpanSource for HttpSource {
    async fn fetch_span_page(
        &self,
        trace_key: &TraceKey,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<SpanPage> {
        let mut query = vec![("limit", page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.as_str().to_string()));
        }
        debug!(trace_key = %trace_key, cursor = ?cursor, page_size, "fetching remote span page");
        self.get_json(self.spans_url(trace_key, &[])?, &query).await
    }

    async fn fetch_span_count(&self, trace_key: &TraceKey) -> Result<u64> {
        let url = self.spans_url(trace_key, &["count"])?;
        let count: SpanCount = self.get_json(url, &[]).await?;
        Ok(count.count)
    }
}
