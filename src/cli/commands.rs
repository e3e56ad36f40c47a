use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::{AppContext, MurmurError, Result};
use crate::domain::{Pattern, ScrapeReport};
use crate::extract::site_shape;
use crate::scrape::ScrapeOptions;

/// Overrides for a scrape run; unset values come from the config
#[derive(Debug, Default)]
pub struct ScrapeArgs {
    pub max_comments: Option<usize>,
    pub deadline_secs: Option<u64>,
    pub concurrency: Option<usize>,
}

/// Collect URLs from the command line and an optional file, skipping blanks
/// and `#` comments
pub fn collect_urls(mut urls: Vec<String>, urls_file: Option<&Path>) -> Result<Vec<String>> {
    if let Some(path) = urls_file {
        let content = std::fs::read_to_string(path)?;
        urls.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }
    Ok(urls)
}

pub async fn scrape(
    ctx: &AppContext,
    urls: Vec<String>,
    args: ScrapeArgs,
    cancel: CancellationToken,
) -> Result<Vec<ScrapeReport>> {
    if urls.is_empty() {
        return Err(MurmurError::InvalidUrl("no URLs given".into()));
    }

    let session = &ctx.config.session;
    let mut options = ScrapeOptions::new(args.max_comments.unwrap_or(session.max_comments))
        .with_cancel(cancel);
    if let Some(secs) = args.deadline_secs.or(session.deadline_secs) {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    let concurrency = args.concurrency.unwrap_or(session.concurrency);
    info!("Scraping {} posts, {} at a time", urls.len(), concurrency);

    let mut reports = Vec::new();
    for (url, result) in ctx.scraper.scrape_many(urls, &options, concurrency).await {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                // Unusable input is reported, not fatal for the batch
                warn!("Skipping {}: {}", url, e);
                eprintln!("Error scraping {}: {}", url, e);
            }
        }
    }

    Ok(reports)
}

/// Render reports as JSON: a single object for one report, an array otherwise
pub fn reports_to_json(reports: &[ScrapeReport]) -> Result<String> {
    let json = match reports {
        [single] => serde_json::to_string_pretty(single)?,
        _ => serde_json::to_string_pretty(reports)?,
    };
    Ok(json)
}

pub fn list_patterns(ctx: &AppContext, shape: Option<&str>) -> Result<()> {
    let patterns: Vec<Pattern> = match shape {
        Some(shape) => ctx.store.lookup(shape)?,
        None => ctx.store.all()?,
    };

    if patterns.is_empty() {
        println!("No patterns");
        return Ok(());
    }

    for pattern in patterns {
        println!(
            "{}  {:.2}  +{} -{}  {}  {}",
            pattern.site_shape_id,
            pattern.confidence,
            pattern.success_count,
            pattern.failure_count,
            pattern.last_used_at.format("%Y-%m-%d %H:%M"),
            serde_json::to_string(&pattern.selector_spec)?
        );
    }

    Ok(())
}

pub fn forget_shape(ctx: &AppContext, shape: &str) -> Result<()> {
    let removed = ctx.store.forget_shape(shape)?;
    if removed == 0 {
        println!("No patterns for shape {}", shape);
        return Ok(());
    }

    ctx.store.persist()?;
    println!("Forgot {} patterns for shape {}", removed, shape);
    Ok(())
}

pub async fn print_shape(ctx: &AppContext, url: &str) -> Result<()> {
    let result = ctx.fetch.fetch(url, None).await?;
    if !result.is_ok() {
        return Err(MurmurError::FetchExhausted {
            url: url.to_string(),
            attempts: 1,
        });
    }

    let shape = site_shape(url, &result.body, ctx.config.extract.shape_depth);
    println!("{}", shape);

    let known = ctx.store.lookup(&shape)?;
    if !known.is_empty() {
        println!("{} learned patterns", known.len());
    }
    Ok(())
}
