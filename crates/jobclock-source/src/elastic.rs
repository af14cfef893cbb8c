use std::time::Duration;

use jobclock_core::{queue_entry, QueueEntry};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::{page_query, parse_search_response, queue_query, FetchError, FetchResult, Page, PageRequest, QueueSource, TelemetrySource};

/// Blocking adapter for an Elasticsearch-compatible `_search` endpoint.
pub struct ElasticSource {
    client: Client,
    search_url: String,
}

impl ElasticSource {
    pub fn new(endpoint: &str, index: &str, timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Config(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            search_url: search_url(endpoint, index),
        })
    }

    pub fn search_url(&self) -> &str {
        &self.search_url
    }

    fn search(&self, body: &Value) -> FetchResult<Page> {
        debug!(url = %self.search_url, body = %body, "search request");
        let resp = self
            .client
            .post(&self.search_url)
            .json(body)
            .send()
            .map_err(|e| FetchError::Transient(format!("POST {}: {e}", self.search_url)))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| FetchError::Transient(format!("read response body: {e}")))?;
        if let Some(err) = classify_status(status, &text) {
            return Err(err);
        }
        parse_search_response(&text)
    }
}

impl TelemetrySource for ElasticSource {
    fn fetch_page(&self, req: &PageRequest<'_>) -> FetchResult<Page> {
        self.search(&page_query(req))
    }
}

impl QueueSource for ElasticSource {
    fn fetch_queue(&self, status: &str, limit: usize) -> FetchResult<Vec<QueueEntry>> {
        let page = self.search(&queue_query(status, limit))?;
        debug!(status, total = page.total, returned = page.hits.len(), "queue snapshot");
        Ok(page.hits.iter().filter_map(queue_entry).collect())
    }
}

/// `endpoint` + `index`; an index that is not itself a `_search` path gets one appended.
pub fn search_url(endpoint: &str, index: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let index = index.trim_matches('/');
    if index.is_empty() {
        format!("{base}/_search")
    } else if index == "_search" || index.ends_with("/_search") {
        format!("{base}/{index}")
    } else {
        format!("{base}/{index}/_search")
    }
}

/// Server-side trouble and throttling are retryable; any other non-success status means the
/// request itself is wrong and retrying it will not help.
pub fn classify_status(status: StatusCode, body: &str) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    let snippet: String = body.chars().take(200).collect();
    let msg = format!("HTTP {status}: {snippet}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Some(FetchError::Transient(msg))
    } else {
        Some(FetchError::Protocol(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_urls() {
        assert_eq!(search_url("http://localhost:9200", "_search"), "http://localhost:9200/_search");
        assert_eq!(search_url("http://es:9200/", "jobs"), "http://es:9200/jobs/_search");
        assert_eq!(search_url("http://es:9200", "job_status-current/_search"), "http://es:9200/job_status-current/_search");
        assert_eq!(search_url("http://es:9200", ""), "http://es:9200/_search");
    }

    #[test]
    fn status_classes() {
        assert!(classify_status(StatusCode::OK, "").is_none());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").unwrap().is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").unwrap().is_transient());
        assert!(matches!(classify_status(StatusCode::BAD_REQUEST, "bad"), Some(FetchError::Protocol(_))));
    }
}
