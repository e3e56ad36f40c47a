//! Rendered-browser collaborator.
//!
//! The fetch layer never talks to a browser directly. It acquires a scoped
//! [`BrowserSession`] from a [`SessionManager`], drives it, and releases it on
//! every exit path.
//!
//! ```text
//! acquire() → render(url) → click_load_more()* → content() → release()
//! ```

mod chrome;
mod config;

pub use chrome::ChromeSessionManager;
pub use config::BrowserConfig;
pub(crate) use config::default_load_more_labels;

use async_trait::async_trait;

use crate::app::Result;
use crate::fetcher::Cursor;

/// Hands out scoped browser sessions
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Acquire a fresh session. Failing here means the browser is unavailable,
    /// which callers treat as fatal.
    async fn acquire(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One browser tab, owned by a single fetch
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url`, wait for dynamic content and return the markup
    async fn render(&mut self, url: &str) -> Result<String>;

    /// Press a "load more" control if one is present.
    ///
    /// Returns the cursor describing the page state after the press, or `None`
    /// when no control was found.
    async fn click_load_more(&mut self) -> Result<Option<Cursor>>;

    /// Current markup of the page
    async fn content(&mut self) -> Result<String>;

    /// Close the session
    async fn release(self: Box<Self>) -> Result<()>;
}
