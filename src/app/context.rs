use std::sync::Arc;

use tracing::{info, warn};

use crate::app::error::Result;
use crate::browser::ChromeSessionManager;
use crate::config::Config;
use crate::discovery::{
    AiDiscoverer, Budget, DisabledDiscoverer, GeminiClient, PatternDiscoverer, RateLimiter,
};
use crate::extract::Extractor;
use crate::fetcher::{BrowserFetcher, FetchChain, FetchStrategy, HttpFetcher};
use crate::scrape::AdaptiveScraper;
use crate::store::{PatternStore, SqliteBackend};

pub struct AppContext {
    pub config: Config,
    pub store: Arc<PatternStore>,
    pub fetch: Arc<FetchChain>,
    pub limiter: Arc<RateLimiter>,
    pub scraper: Arc<AdaptiveScraper>,
}

impl AppContext {
    /// Wire every component from `config`, loading learned patterns from disk
    pub fn new(config: Config) -> Result<Self> {
        let db_path = config.store_path()?;
        let backend = Arc::new(SqliteBackend::new(&db_path)?);
        let store = Arc::new(PatternStore::new(config.learning.clone(), backend));
        store.load()?;
        info!("Using pattern store at {}", db_path.display());

        Self::with_store(config, store)
    }

    /// Same wiring with a store that is never written to disk
    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(PatternStore::in_memory(config.learning.clone()));
        Self::with_store(config, store)
    }

    fn with_store(config: Config, store: Arc<PatternStore>) -> Result<Self> {
        let fetch = Arc::new(Self::fetch_chain(&config)?);
        let limiter = Arc::new(RateLimiter::new(config.ai.rate_limits()));
        let discoverer = Self::discoverer(&config, limiter.clone());

        let scraper = AdaptiveScraper::new(
            fetch.clone(),
            store.clone(),
            discoverer,
            Extractor::new(config.extract.clone()),
        )
        .with_fetch_config(config.fetch.clone())
        .with_session_config(config.session.clone())
        .with_budget(Budget::new(config.ai.max_input_tokens));

        Ok(Self {
            config,
            store,
            fetch,
            limiter,
            scraper: Arc::new(scraper),
        })
    }

    fn fetch_chain(config: &Config) -> Result<FetchChain> {
        let mut strategies: Vec<Arc<dyn FetchStrategy + Send + Sync>> =
            vec![Arc::new(HttpFetcher::new(config.fetch.clone())?)];

        if config.browser.enabled {
            let sessions = Arc::new(ChromeSessionManager::new(config.browser.clone()));
            strategies.push(Arc::new(BrowserFetcher::new(
                sessions,
                config.fetch.min_body_bytes,
            )));
        }

        Ok(FetchChain::new(strategies, config.fetch.min_body_bytes))
    }

    fn discoverer(config: &Config, limiter: Arc<RateLimiter>) -> Arc<dyn PatternDiscoverer> {
        if !config.ai.enabled {
            return Arc::new(DisabledDiscoverer);
        }

        match GeminiClient::from_config(&config.ai) {
            Ok(client) => Arc::new(AiDiscoverer::new(
                Arc::new(client),
                limiter,
                config.ai.clone(),
            )),
            Err(e) => {
                warn!("Pattern discovery disabled: {}", e);
                Arc::new(DisabledDiscoverer)
            }
        }
    }
}
