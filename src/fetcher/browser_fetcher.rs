use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::app::{MurmurError, Result};
use crate::browser::{BrowserSession, SessionManager};
use crate::fetcher::{Cursor, FetchMethod, FetchResult, FetchStatus, FetchStrategy};

/// Rendered fetch through a browser session.
///
/// A `LoadMore(n)` cursor re-renders the post and presses the control `n`
/// times before capturing the markup. One extra press afterwards decides
/// whether a further cursor exists.
pub struct BrowserFetcher {
    sessions: Arc<dyn SessionManager>,
    min_body_bytes: usize,
}

impl BrowserFetcher {
    pub fn new(sessions: Arc<dyn SessionManager>, min_body_bytes: usize) -> Self {
        Self {
            sessions,
            min_body_bytes,
        }
    }
}

async fn drive(
    session: &mut dyn BrowserSession,
    target: &Url,
    wanted: u32,
    min_body_bytes: usize,
) -> Result<FetchResult> {
    let mut body = session.render(target.as_str()).await?;

    let mut pressed = 0;
    while pressed < wanted {
        match session.click_load_more().await? {
            Some(_) => pressed += 1,
            None => break,
        }
    }

    if pressed < wanted {
        debug!("Load-more control ran out after {} presses", pressed);
        if pressed == 0 {
            return Ok(FetchResult::failed(FetchMethod::Browser, FetchStatus::Empty));
        }
    }
    if pressed > 0 {
        body = session.content().await?;
    }

    let status = if body.len() < min_body_bytes {
        FetchStatus::Empty
    } else {
        FetchStatus::Ok
    };

    let next_cursor = if status == FetchStatus::Ok && pressed == wanted {
        session
            .click_load_more()
            .await?
            .map(|_| Cursor::LoadMore(wanted + 1))
    } else {
        None
    };

    Ok(FetchResult::new(FetchMethod::Browser, status, body).with_cursor(next_cursor))
}

#[async_trait]
impl FetchStrategy for BrowserFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Browser
    }

    async fn fetch(&self, url: &Url, cursor: Option<&Cursor>) -> Result<FetchResult> {
        debug!("Fetching {} with browser", url);

        let target = match cursor {
            Some(Cursor::Link(link)) => match url.join(link) {
                Ok(target) => target,
                Err(e) => {
                    warn!("Bad continuation link {:?} for {}: {}", link, url, e);
                    return Ok(FetchResult::failed(FetchMethod::Browser, FetchStatus::Error));
                }
            },
            _ => url.clone(),
        };
        let wanted = match cursor {
            Some(Cursor::LoadMore(n)) => *n,
            _ => 0,
        };

        // Failing to obtain a session means no browser at all
        let mut session = self.sessions.acquire().await?;

        // The session is driven in its own task so it is released even when
        // this future is dropped mid-render
        let abandoned = CancellationToken::new();
        let _abandon_on_drop = abandoned.clone().drop_guard();
        let min_body_bytes = self.min_body_bytes;
        let task = tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = drive(session.as_mut(), &target, wanted, min_body_bytes) => Some(outcome),
                _ = abandoned.cancelled() => None,
            };
            if let Err(e) = session.release().await {
                warn!("Failed to release browser session: {}", e);
            }
            outcome
        });

        let outcome = match task.await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return Err(MurmurError::Browser("fetch abandoned".into())),
            Err(e) => return Err(MurmurError::Task(e.to_string())),
        };

        match outcome {
            Ok(result) => Ok(result),
            Err(MurmurError::Browser(e)) => {
                warn!("Browser fetch of {} failed: {}", url, e);
                Ok(FetchResult::failed(FetchMethod::Browser, FetchStatus::Error))
            }
            Err(e) => Err(e),
        }
    }
}
