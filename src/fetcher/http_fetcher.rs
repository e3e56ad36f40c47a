use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::app::Result;
use crate::fetcher::{Cursor, FetchConfig, FetchMethod, FetchResult, FetchStatus, FetchStrategy};

/// Direct request with reqwest. Cheap, but sees only server-rendered markup.
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    fn classify_status(status: StatusCode) -> Option<FetchStatus> {
        match status {
            StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE => Some(FetchStatus::Blocked),
            s if s.is_success() => None,
            _ => Some(FetchStatus::Error),
        }
    }

    fn is_blocked_page(&self, body: &str) -> bool {
        self.config
            .block_markers
            .iter()
            .any(|marker| !marker.is_empty() && body.contains(marker.as_str()))
    }
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Http
    }

    async fn fetch(&self, url: &Url, cursor: Option<&Cursor>) -> Result<FetchResult> {
        let target = match cursor {
            None => url.clone(),
            Some(Cursor::Link(link)) => match url.join(link) {
                Ok(target) => target,
                Err(e) => {
                    warn!("Unusable continuation link {}: {}", link, e);
                    return Ok(FetchResult::failed(FetchMethod::Http, FetchStatus::Error));
                }
            },
            // Pressing buttons needs a rendered page
            Some(Cursor::LoadMore(_)) => {
                return Ok(FetchResult::failed(FetchMethod::Http, FetchStatus::Empty));
            }
        };

        debug!("Fetching {} with direct request", target);

        let response = match self.client.get(target.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request to {} failed: {}", target, e);
                return Ok(FetchResult::failed(FetchMethod::Http, FetchStatus::Error));
            }
        };

        let status = response.status();
        if let Some(fetch_status) = Self::classify_status(status) {
            warn!("Failed to fetch {}: HTTP {}", target, status);
            let mut result = FetchResult::failed(FetchMethod::Http, fetch_status);
            result.http_status = Some(status.as_u16());
            return Ok(result);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read body from {}: {}", target, e);
                return Ok(FetchResult::failed(FetchMethod::Http, FetchStatus::Error));
            }
        };

        let fetch_status = if self.is_blocked_page(&body) {
            FetchStatus::Blocked
        } else if body.len() < self.config.min_body_bytes {
            FetchStatus::Empty
        } else {
            FetchStatus::Ok
        };

        let next_cursor = if fetch_status == FetchStatus::Ok {
            find_more_link(&body, &target, &self.config.load_more_labels)
        } else {
            None
        };

        let mut result =
            FetchResult::new(FetchMethod::Http, fetch_status, body).with_cursor(next_cursor);
        result.http_status = Some(status.as_u16());
        Ok(result)
    }
}

/// Find an anchor whose label matches a "load more" phrase
pub(crate) fn find_more_link(body: &str, base: &Url, labels: &[String]) -> Option<Cursor> {
    if labels.is_empty() {
        return None;
    }
    let labels: Vec<String> = labels.iter().map(|l| l.to_lowercase()).collect();
    let document = Html::parse_document(body);
    let anchors = Selector::parse("a[href]").ok()?;

    for anchor in document.select(&anchors) {
        let text = anchor
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if text.is_empty() || !labels.iter().any(|label| text.contains(label.as_str())) {
            continue;
        }

        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }
        if let Ok(next) = base.join(href) {
            return Some(Cursor::Link(next.to_string()));
        }
    }

    None
}
