use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the rendered-browser fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Whether the browser fallback is used at all (default: true)
    pub enabled: bool,

    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// Explicit Chrome/Chromium executable; auto-detected when unset
    pub chrome_path: Option<PathBuf>,

    /// Page load timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// Wait time after page load for dynamic content in milliseconds (default: 2000)
    pub wait_after_load_ms: u64,

    /// Number of scroll steps after load to reveal lazy content (default: 5)
    pub scroll_steps: u32,

    /// Pixels per scroll step (default: 800)
    pub scroll_distance_px: u32,

    /// Pause between scroll steps in milliseconds (default: 800)
    pub scroll_pause_ms: u64,

    /// Wait time after pressing a "load more" control in milliseconds (default: 2000)
    pub load_more_wait_ms: u64,

    /// Cookie consent buttons to press if present, in priority order
    pub consent_selectors: Vec<String>,

    /// Visible labels of "load more" controls (matched case-insensitively)
    pub load_more_labels: Vec<String>,

    /// User agent string to use
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            chrome_path: None,
            timeout_secs: 30,
            wait_after_load_ms: 2000,
            scroll_steps: 5,
            scroll_distance_px: 800,
            scroll_pause_ms: 800,
            load_more_wait_ms: 2000,
            consent_selectors: vec![
                "button[data-cookiebanner=\"accept_button\"]".to_string(),
                "button[data-testid=\"cookie-policy-manage-dialog-accept-button\"]".to_string(),
                "button[title=\"Accept All\"]".to_string(),
                "button[title=\"Accept all\"]".to_string(),
            ],
            load_more_labels: default_load_more_labels(),
            user_agent: Some(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }
}

pub(crate) fn default_load_more_labels() -> Vec<String> {
    vec![
        "View more comments".to_string(),
        "See more comments".to_string(),
        "View previous comments".to_string(),
        "Load more comments".to_string(),
        "Show more replies".to_string(),
    ]
}

impl BrowserConfig {
    /// Get the page load timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get the wait time after load as a Duration
    pub fn wait_after_load(&self) -> Duration {
        Duration::from_millis(self.wait_after_load_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn load_more_wait(&self) -> Duration {
        Duration::from_millis(self.load_more_wait_ms)
    }

    /// Create a config optimized for speed (fewer comments revealed)
    pub fn fast() -> Self {
        Self {
            timeout_secs: 15,
            wait_after_load_ms: 500,
            scroll_steps: 1,
            load_more_wait_ms: 1000,
            ..Default::default()
        }
    }

    /// Create a config optimized for reaching more comments (slower)
    pub fn thorough() -> Self {
        Self {
            timeout_secs: 60,
            wait_after_load_ms: 3000,
            scroll_steps: 10,
            load_more_wait_ms: 3000,
            ..Default::default()
        }
    }
}
