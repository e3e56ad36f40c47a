use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::error;

use crate::app::{MurmurError, Result};
use crate::domain::ScrapeReport;
use crate::scrape::{AdaptiveScraper, ScrapeOptions};

impl AdaptiveScraper {
    /// Scrape several posts concurrently, at most `concurrency` at a time.
    ///
    /// Sessions share the pattern store and rate limiter. Results come back in
    /// input order.
    pub async fn scrape_many(
        self: &Arc<Self>,
        urls: Vec<String>,
        options: &ScrapeOptions,
        concurrency: usize,
    ) -> Vec<(String, Result<ScrapeReport>)> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let scraper = Arc::clone(self);
            let semaphore = semaphore.clone();
            let options = options.clone();
            let task_url = url.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                scraper.scrape(&task_url, &options).await
            });

            handles.push((url, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (url, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Scrape task for {} failed: {}", url, e);
                    Err(MurmurError::Task(e.to_string()))
                }
            };
            results.push((url, result));
        }

        results
    }
}
