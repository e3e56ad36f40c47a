//! The adaptive scraper: fetch, match stored patterns, fall back to
//! discovery, learn, paginate.

mod batch;
mod config;
mod session;

pub use config::SessionConfig;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::{MurmurError, Result};
use crate::discovery::{Budget, PatternDiscoverer, TargetSchema};
use crate::domain::{Comment, FailureReason, ScrapeReport, SelectorSpec, SessionState};
use crate::extract::{site_shape, Extractor};
use crate::fetcher::{validate_url, Cursor, FetchChain, FetchConfig, FetchResult};
use crate::store::PatternStore;

use session::ScrapeSession;

/// Caller controls for one scrape
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub max_comments: usize,
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl ScrapeOptions {
    pub fn new(max_comments: usize) -> Self {
        Self {
            max_comments,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }
}

/// Why a session stopped before running out of pages
enum Stop {
    Cancelled,
    Failed(FailureReason),
}

/// Outcome of trying the stored patterns for a shape
enum StoredMatch {
    Hit(Vec<Comment>),
    /// Nothing matched; carries the specs that were tried
    Miss(Vec<SelectorSpec>),
}

/// Run `fut` unless the caller cancels or the deadline passes first
async fn guarded<F: Future>(options: &ScrapeOptions, fut: F) -> Option<F::Output> {
    let deadline = async {
        match options.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = options.cancel.cancelled() => None,
        _ = deadline => None,
        output = fut => Some(output),
    }
}

pub struct AdaptiveScraper {
    fetch: Arc<FetchChain>,
    store: Arc<PatternStore>,
    discoverer: Arc<dyn PatternDiscoverer>,
    extractor: Extractor,
    fetch_config: FetchConfig,
    session_config: SessionConfig,
    schema: TargetSchema,
    budget: Budget,
}

impl AdaptiveScraper {
    pub fn new(
        fetch: Arc<FetchChain>,
        store: Arc<PatternStore>,
        discoverer: Arc<dyn PatternDiscoverer>,
        extractor: Extractor,
    ) -> Self {
        Self {
            fetch,
            store,
            discoverer,
            extractor,
            fetch_config: FetchConfig::default(),
            session_config: SessionConfig::default(),
            schema: TargetSchema::default(),
            budget: Budget::new(8_000),
        }
    }

    pub fn with_fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch_config = config;
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Default options built from the session config
    pub fn default_options(&self) -> ScrapeOptions {
        let options = ScrapeOptions::new(self.session_config.max_comments);
        match self.session_config.deadline() {
            Some(timeout) => options.with_timeout(timeout),
            None => options,
        }
    }

    /// Scrape up to `options.max_comments` comments from `url`.
    ///
    /// Only an invalid URL is an error. Every other outcome, including
    /// failures and cancellation, is reported in the [`ScrapeReport`].
    pub async fn scrape(&self, url: &str, options: &ScrapeOptions) -> Result<ScrapeReport> {
        validate_url(url)?;
        info!("Scraping {}", url);

        let mut session = ScrapeSession::new(url, options.max_comments);
        let stop = self.run(&mut session, options).await;

        if self.store.is_dirty() {
            if let Err(e) = self.store.persist() {
                warn!("Failed to persist patterns: {}", e);
            }
        }

        let report = match stop {
            Ok(()) => session.finish(None, false),
            Err(Stop::Cancelled) => {
                info!("Scrape of {} cancelled", url);
                session.finish(None, true)
            }
            Err(Stop::Failed(reason)) => session.finish(Some(reason), false),
        };

        info!(
            url = %report.url,
            state = ?report.state,
            comments = report.comments.len(),
            pages = report.pages_fetched,
            "Scrape finished"
        );
        Ok(report)
    }

    async fn run(&self, session: &mut ScrapeSession, options: &ScrapeOptions) -> std::result::Result<(), Stop> {
        if session.max_comments == 0 {
            return Ok(());
        }

        let mut cursor: Option<Cursor> = None;
        loop {
            session.transition(SessionState::Fetching);
            let page = self.fetch_page(session, cursor.as_ref(), options).await?;
            session.pages += 1;

            let shape = match session.site_shape {
                Some(ref shape) => shape.clone(),
                None => {
                    let shape =
                        site_shape(&session.url, &page.body, self.extractor.config().shape_depth);
                    debug!("Site shape for {} is {}", session.url, shape);
                    session.site_shape = Some(shape.clone());
                    shape
                }
            };

            session.transition(SessionState::Matching);
            let comments = match self.match_stored(session, &shape, &page.body)? {
                StoredMatch::Hit(comments) => comments,
                StoredMatch::Miss(stale) => {
                    match self.match_seeds(session, &shape, &page.body, &stale) {
                        Some(comments) => comments,
                        None => {
                            self.discover(session, &shape, &page.body, &stale, options)
                                .await?
                        }
                    }
                }
            };

            session.transition(SessionState::Extracting);
            let added = session.absorb(comments);
            debug!("Page {} added {} comments", session.pages, added);

            session.transition(SessionState::Paginating);
            if session.is_full() {
                debug!("Reached {} comments", session.max_comments);
                return Ok(());
            }
            if added == 0 {
                debug!("Page added nothing new, stopping");
                return Ok(());
            }
            if session.pages >= self.session_config.max_pages {
                debug!("Reached page limit {}", self.session_config.max_pages);
                return Ok(());
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }

    async fn fetch_page(
        &self,
        session: &mut ScrapeSession,
        cursor: Option<&Cursor>,
        options: &ScrapeOptions,
    ) -> std::result::Result<FetchResult, Stop> {
        let max_attempts = self.fetch_config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            session.fetch_attempts += 1;

            let result = match guarded(options, self.fetch.fetch(&session.url, cursor)).await {
                None => return Err(Stop::Cancelled),
                Some(Err(e)) => {
                    warn!("Fetch of {} failed fatally: {}", session.url, e);
                    return Err(Stop::Failed(FailureReason::Fatal(e.to_string())));
                }
                Some(Ok(result)) => result,
            };

            if result.is_ok() {
                debug!(method = ?result.method, bytes = result.body.len(), "Fetched page");
                return Ok(result);
            }

            warn!(
                "Fetch attempt {}/{} for {} came back {:?}",
                attempt + 1,
                max_attempts,
                session.url,
                result.status
            );
            if attempt + 1 < max_attempts {
                let delay = self.fetch_config.backoff(attempt);
                if guarded(options, tokio::time::sleep(delay)).await.is_none() {
                    return Err(Stop::Cancelled);
                }
            }
        }

        let exhausted = MurmurError::FetchExhausted {
            url: session.url.clone(),
            attempts: max_attempts,
        };
        warn!("{}", exhausted);
        Err(Stop::Failed(FailureReason::FetchExhausted))
    }

    /// Try stored patterns best first, scoring each one tried
    fn match_stored(
        &self,
        session: &mut ScrapeSession,
        shape: &str,
        body: &str,
    ) -> std::result::Result<StoredMatch, Stop> {
        let patterns = self
            .store
            .lookup(shape)
            .map_err(|e| Stop::Failed(FailureReason::Fatal(e.to_string())))?;
        debug!("{} stored patterns for shape {}", patterns.len(), shape);

        let mut stale = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            session.patterns_tried += 1;
            let comments = match self.extractor.extract(body, &pattern.selector_spec) {
                Ok(comments) => comments,
                Err(e) => {
                    warn!("Stored pattern {} no longer valid: {}", pattern.id, e);
                    Vec::new()
                }
            };

            let success = !comments.is_empty();
            if let Err(e) = self.store.record_outcome(&pattern.id, success) {
                warn!("Failed to score pattern {}: {}", pattern.id, e);
            }
            if success {
                debug!(
                    "Pattern {} matched {} comments (confidence {:.2})",
                    pattern.id,
                    comments.len(),
                    pattern.confidence
                );
                return Ok(StoredMatch::Hit(comments));
            }
            stale.push(pattern.selector_spec);
        }

        Ok(StoredMatch::Miss(stale))
    }

    /// Try the configured seed containers, learning the first that matches
    fn match_seeds(
        &self,
        session: &mut ScrapeSession,
        shape: &str,
        body: &str,
        stale: &[SelectorSpec],
    ) -> Option<Vec<Comment>> {
        for seed in &self.extractor.config().seed_selectors {
            let spec = SelectorSpec::new(seed.as_str());
            if stale.iter().any(|s| s.structurally_eq(&spec)) {
                continue;
            }

            session.patterns_tried += 1;
            let comments = match self.extractor.extract(body, &spec) {
                Ok(comments) if !comments.is_empty() => comments,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Seed selector {:?} rejected: {}", seed, e);
                    continue;
                }
            };

            debug!("Seed selector {:?} matched {} comments", seed, comments.len());
            self.learn(session, shape, spec);
            return Some(comments);
        }
        None
    }

    fn learn(&self, session: &mut ScrapeSession, shape: &str, spec: SelectorSpec) {
        session.transition(SessionState::Learning);
        let learned = self
            .store
            .add_pattern(shape, spec)
            .and_then(|pattern| self.store.record_outcome(&pattern.id, true));
        match learned {
            Ok(Some(pattern)) => info!("Learned pattern {} for shape {}", pattern.id, shape),
            Ok(None) => {}
            Err(e) => warn!("Failed to store learned pattern: {}", e),
        }
    }

    /// Ask the discoverer for candidates and learn the first that works
    async fn discover(
        &self,
        session: &mut ScrapeSession,
        shape: &str,
        body: &str,
        stale: &[SelectorSpec],
        options: &ScrapeOptions,
    ) -> std::result::Result<Vec<Comment>, Stop> {
        session.transition(SessionState::AiDiscovering);
        session.ai_invocations += 1;

        let discovered = if stale.is_empty() {
            guarded(
                options,
                self.discoverer.discover(body, &self.schema, &self.budget),
            )
            .await
        } else {
            guarded(
                options,
                self.discoverer
                    .rediscover(body, &self.schema, &self.budget, stale),
            )
            .await
        };

        let candidates = match discovered {
            None => return Err(Stop::Cancelled),
            Some(Ok(candidates)) => candidates,
            Some(Err(MurmurError::QuotaExhausted(e))) => {
                warn!("Model quota exhausted: {}", e);
                return Err(Stop::Failed(FailureReason::QuotaExhausted));
            }
            Some(Err(e @ MurmurError::TransientService { .. })) => {
                warn!("{}", e);
                return Err(Stop::Failed(FailureReason::NoPatternFound));
            }
            Some(Err(e)) => {
                warn!("Pattern discovery failed: {}", e);
                return Err(Stop::Failed(FailureReason::Fatal(e.to_string())));
            }
        };

        for spec in candidates {
            session.patterns_tried += 1;
            let comments = match self.extractor.extract(body, &spec) {
                Ok(comments) if !comments.is_empty() => comments,
                Ok(_) => {
                    debug!("Candidate {:?} matched nothing", spec.item);
                    continue;
                }
                Err(e) => {
                    debug!("Candidate {:?} rejected: {}", spec.item, e);
                    continue;
                }
            };

            self.learn(session, shape, spec);
            return Ok(comments);
        }

        info!("No candidate pattern matched {}", session.url);
        Err(Stop::Failed(FailureReason::NoPatternFound))
    }
}
