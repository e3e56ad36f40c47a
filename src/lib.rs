//! # Murmur
//!
//! Adaptive comment extraction for social media posts.
//!
//! ## Architecture
//!
//! Each post is scraped by a small state machine:
//!
//! ```text
//! Fetch → Match stored patterns → Extract → (AI discovery → Learn) → Paginate
//! ```
//!
//! Pages are fingerprinted into a site shape. Selector patterns that worked
//! for a shape are stored with a confidence score, so later posts on the same
//! layout are extracted without asking the model again.
//!
//! ## Quick Start
//!
//! ```bash
//! # Scrape one post
//! murmur scrape https://www.facebook.com/somepage/posts/123
//!
//! # Inspect what has been learned
//! murmur patterns list
//!
//! # Drop patterns for a layout that changed
//! murmur patterns forget 3f9a0c1e2b7d4a6f
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// fetch chain, pattern store, discoverer and scraper.
pub mod app;

/// Headless Chrome sessions used by the browser fetch strategy.
pub mod browser;

/// Command-line interface using clap.
///
/// - `scrape <urls>...` - Scrape comments and print a JSON report
/// - `patterns list [--shape]` - List learned patterns
/// - `patterns forget <shape>` - Forget patterns for a site shape
/// - `shape <url>` - Print the site shape of a page
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/murmur/config.toml`.
pub mod config;

/// Pattern discovery through a language model.
///
/// - [`PatternDiscoverer`](discovery::PatternDiscoverer): Async trait for discovery
/// - [`AiDiscoverer`](discovery::AiDiscoverer): Rate limited, retrying model client
/// - [`RateLimiter`](discovery::RateLimiter): Per-minute and per-day quotas
pub mod discovery;

/// Core domain models.
///
/// - [`Comment`](domain::Comment): An extracted comment with a content fingerprint
/// - [`Pattern`](domain::Pattern): A learned selector spec with confidence
/// - [`ScrapeReport`](domain::ScrapeReport): Outcome of one scrape session
pub mod domain;

/// Selector-driven extraction, site shapes and page simplification.
pub mod extract;

/// Page fetching.
///
/// - [`FetchStrategy`](fetcher::FetchStrategy): Async trait for one way of fetching
/// - [`FetchChain`](fetcher::FetchChain): Tries strategies in order
pub mod fetcher;

/// The adaptive scrape state machine.
pub mod scrape;

/// Learned pattern persistence.
///
/// - [`PatternStore`](store::PatternStore): In-memory patterns with confidence tracking
/// - [`SqliteBackend`](store::SqliteBackend): SQLite persistence
pub mod store;
