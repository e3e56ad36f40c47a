pub mod browser_fetcher;
pub mod config;
pub mod http_fetcher;

pub use browser_fetcher::BrowserFetcher;
pub use config::FetchConfig;
pub use http_fetcher::HttpFetcher;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::app::{MurmurError, Result};

/// Continuation state for paginated or "load more" content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cursor {
    /// Follow a "more comments" link found in static markup
    Link(String),
    /// Render the page and press the "load more" control this many times
    LoadMore(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Http,
    Browser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Ok,
    Blocked,
    Empty,
    Error,
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub method: FetchMethod,
    pub body: String,
    pub status: FetchStatus,
    pub fetched_at: DateTime<Utc>,
    pub next_cursor: Option<Cursor>,
    pub http_status: Option<u16>,
}

impl FetchResult {
    pub fn new(method: FetchMethod, status: FetchStatus, body: String) -> Self {
        Self {
            method,
            body,
            status,
            fetched_at: Utc::now(),
            next_cursor: None,
            http_status: None,
        }
    }

    pub fn ok(method: FetchMethod, body: String) -> Self {
        Self::new(method, FetchStatus::Ok, body)
    }

    pub fn failed(method: FetchMethod, status: FetchStatus) -> Self {
        Self::new(method, status, String::new())
    }

    pub fn with_cursor(mut self, cursor: Option<Cursor>) -> Self {
        self.next_cursor = cursor;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == FetchStatus::Ok
    }
}

/// One way of obtaining a page body.
///
/// Returning `Ok` with a non-`Ok` status is the normal "nothing useful" case.
/// `Err` is reserved for fatal collaborator failures.
#[async_trait]
pub trait FetchStrategy {
    fn method(&self) -> FetchMethod;

    async fn fetch(&self, url: &Url, cursor: Option<&Cursor>) -> Result<FetchResult>;
}

/// Check that `url` is an absolute http(s) URL with a host
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MurmurError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, url
            )))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(MurmurError::InvalidUrl(format!("missing host in {}", url)));
    }
    Ok(parsed)
}

/// Ordered fallback chain: cheaper strategies first
pub struct FetchChain {
    strategies: Vec<Arc<dyn FetchStrategy + Send + Sync>>,
    min_body_bytes: usize,
}

impl FetchChain {
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy + Send + Sync>>, min_body_bytes: usize) -> Self {
        Self {
            strategies,
            min_body_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Fetch through the chain, returning the first result with enough content.
    ///
    /// When every strategy comes up short, the last strategy's result is
    /// returned so the caller sees why.
    pub async fn fetch(&self, url: &str, cursor: Option<&Cursor>) -> Result<FetchResult> {
        let parsed = validate_url(url)?;

        let mut last = None;
        for strategy in &self.strategies {
            let mut result = strategy.fetch(&parsed, cursor).await?;

            if result.is_ok() && result.body.len() < self.min_body_bytes {
                debug!(
                    method = ?result.method,
                    bytes = result.body.len(),
                    "Body below minimum size, treating as empty"
                );
                result.status = FetchStatus::Empty;
            }

            if result.is_ok() {
                return Ok(result);
            }

            debug!(method = ?result.method, status = ?result.status, "Fetch method fell through");
            last = Some(result);
        }

        Ok(last.unwrap_or_else(|| FetchResult::failed(FetchMethod::Http, FetchStatus::Error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Scripted {
        method: FetchMethod,
        status: FetchStatus,
        body: String,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(method: FetchMethod, status: FetchStatus, body: &str) -> Arc<Self> {
            Arc::new(Self {
                method,
                status,
                body: body.to_string(),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl FetchStrategy for Scripted {
        fn method(&self) -> FetchMethod {
            self.method
        }

        async fn fetch(&self, _url: &Url, _cursor: Option<&Cursor>) -> Result<FetchResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchResult::new(self.method, self.status, self.body.clone()))
        }
    }

    struct Broken;

    #[async_trait]
    impl FetchStrategy for Broken {
        fn method(&self) -> FetchMethod {
            FetchMethod::Browser
        }

        async fn fetch(&self, _url: &Url, _cursor: Option<&Cursor>) -> Result<FetchResult> {
            Err(MurmurError::Browser("no chrome".into()))
        }
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://www.facebook.com/post/1").is_ok());
        assert!(matches!(
            validate_url("not a url"),
            Err(MurmurError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("ftp://example.com/file"),
            Err(MurmurError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("/relative/path"),
            Err(MurmurError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_first_ok_wins() {
        let http = Scripted::new(FetchMethod::Http, FetchStatus::Ok, &"x".repeat(100));
        let browser = Scripted::new(FetchMethod::Browser, FetchStatus::Ok, &"y".repeat(100));
        let strategies: Vec<Arc<dyn FetchStrategy + Send + Sync>> = vec![http.clone(), browser.clone()];
        let chain = FetchChain::new(strategies, 10);

        let result = chain.fetch("https://example.com/p/1", None).await.unwrap();
        assert_eq!(result.method, FetchMethod::Http);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blocked_falls_back() {
        let http = Scripted::new(FetchMethod::Http, FetchStatus::Blocked, "");
        let browser = Scripted::new(FetchMethod::Browser, FetchStatus::Ok, &"y".repeat(100));
        let strategies: Vec<Arc<dyn FetchStrategy + Send + Sync>> = vec![http.clone(), browser.clone()];
        let chain = FetchChain::new(strategies, 10);

        let result = chain.fetch("https://example.com/p/1", None).await.unwrap();
        assert_eq!(result.method, FetchMethod::Browser);
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_small_body_falls_back() {
        let http = Scripted::new(FetchMethod::Http, FetchStatus::Ok, "tiny");
        let browser = Scripted::new(FetchMethod::Browser, FetchStatus::Ok, &"y".repeat(100));
        let strategies: Vec<Arc<dyn FetchStrategy + Send + Sync>> = vec![http, browser];
        let chain = FetchChain::new(strategies, 50);

        let result = chain.fetch("https://example.com/p/1", None).await.unwrap();
        assert_eq!(result.method, FetchMethod::Browser);
    }

    #[tokio::test]
    async fn test_all_short_returns_last_status() {
        let http = Scripted::new(FetchMethod::Http, FetchStatus::Blocked, "");
        let browser = Scripted::new(FetchMethod::Browser, FetchStatus::Ok, "tiny");
        let strategies: Vec<Arc<dyn FetchStrategy + Send + Sync>> = vec![http, browser];
        let chain = FetchChain::new(strategies, 50);

        let result = chain.fetch("https://example.com/p/1", None).await.unwrap();
        assert_eq!(result.method, FetchMethod::Browser);
        assert_eq!(result.status, FetchStatus::Empty);
    }

    #[tokio::test]
    async fn test_invalid_url_raises() {
        let http = Scripted::new(FetchMethod::Http, FetchStatus::Ok, "body");
        let strategies: Vec<Arc<dyn FetchStrategy + Send + Sync>> = vec![http.clone()];
        let chain = FetchChain::new(strategies, 1);

        let err = chain.fetch("nope", None).await.unwrap_err();
        assert!(matches!(err, MurmurError::InvalidUrl(_)));
        assert_eq!(http.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fatal_collaborator_error_propagates() {
        let http = Scripted::new(FetchMethod::Http, FetchStatus::Empty, "");
        let strategies: Vec<Arc<dyn FetchStrategy + Send + Sync>> = vec![http, Arc::new(Broken)];
        let chain = FetchChain::new(strategies, 1);

        let err = chain.fetch("https://example.com/p/1", None).await.unwrap_err();
        assert!(matches!(err, MurmurError::Browser(_)));
    }

    #[tokio::test]
    async fn test_empty_chain_reports_error() {
        let chain = FetchChain::new(Vec::new(), 1);
        let result = chain.fetch("https://example.com/p/1", None).await.unwrap();
        assert_eq!(result.status, FetchStatus::Error);
    }
}
