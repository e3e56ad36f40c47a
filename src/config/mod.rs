//! Configuration management for murmur.
//!
//! Configuration is read from `~/.config/murmur/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use crate::browser::BrowserConfig;
use crate::discovery::AiConfig;
use crate::extract::ExtractConfig;
use crate::fetcher::FetchConfig;
use crate::scrape::SessionConfig;
use crate::store::LearningConfig;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pattern database location; `<data_dir>/murmur/patterns.db` when unset
    pub store_path: Option<PathBuf>,
    pub fetch: FetchConfig,
    pub browser: BrowserConfig,
    pub learning: LearningConfig,
    pub extract: ExtractConfig,
    pub ai: AiConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating it if missing.
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/murmur/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("murmur").join("config.toml"))
    }

    /// Where the pattern database lives
    pub fn store_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.store_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(data_dir.join("murmur").join("patterns.db"))
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# murmur configuration
#
# Every key is optional; missing keys use the values shown here.

# Pattern database (defaults to <data dir>/murmur/patterns.db)
# store_path = "/var/lib/murmur/patterns.db"

[fetch]
# Direct request timeout in seconds
timeout_secs = 30

# Bodies shorter than this many bytes count as empty
min_body_bytes = 2048

# Text that marks a login wall or block page in an otherwise successful response
block_markers = [
    "id=\"login_form\"",
    "/checkpoint/",
    "You must log in to continue",
]

# Fetch attempts per page, and the backoff between them (milliseconds)
max_attempts = 3
retry_backoff_ms = 2000
max_backoff_ms = 10000

[browser]
# Fall back to a rendered browser when direct requests come up short
enabled = true

# Run browser in headless mode (no visible window)
headless = true

# Page load timeout in seconds
timeout_secs = 30

# Wait time after page load for dynamic content (milliseconds)
wait_after_load_ms = 2000

# Scrolling after load to reveal lazily loaded comments
scroll_steps = 5
scroll_distance_px = 800
scroll_pause_ms = 800

# Wait after pressing a "load more" control (milliseconds)
load_more_wait_ms = 2000

# Cookie consent buttons to press if present
consent_selectors = [
    "button[data-cookiebanner=\"accept_button\"]",
    "button[data-testid=\"cookie-policy-manage-dialog-accept-button\"]",
    "button[title=\"Accept All\"]",
    "button[title=\"Accept all\"]",
]

[learning]
# Weight of the latest outcome in a pattern's confidence
ema_alpha = 0.3

# Confidence of a newly learned pattern
seed_confidence = 0.5

# Patterns below this confidence after min_attempts uses are retired
retire_threshold = 0.15
min_attempts = 5

[extract]
# Interface labels stripped from the start or end of comment text
noise_phrases = ["Like", "Reply", "Share", "See Translation", "Edited"]

# Depth of the page outline used to recognise a layout
shape_depth = 8

# Comment containers tried on an unknown layout before asking the model.
# One that matches is learned like a discovered pattern.
seed_selectors = [
    "div[role=\"article\"]",
    "div[data-testid=\"comment\"]",
    "div[data-testid=\"UFI2Comment\"]",
    "div.UFICommentContent",
    "div.UFIComment",
    "div._4eek",
    "div.comment",
]

[ai]
# Ask a model for new patterns when no stored pattern matches
enabled = true
model = "gemini-1.5-pro"
api_base = "https://generativelanguage.googleapis.com/v1beta"

# Environment variable holding the API key
api_key_env = "GEMINI_API_KEY"

# Quotas
requests_per_minute = 15
requests_per_day = 1500
tokens_per_minute = 32000

# Input budget per discovery prompt (about 4 characters per token)
max_input_tokens = 8000

# Retries for timeouts, 5xx and 429 responses
max_attempts = 4
base_backoff_ms = 1000
max_backoff_ms = 30000

max_candidates = 5
request_timeout_secs = 60

[session]
# Comments collected per post
max_comments = 100

# Pages followed per post
max_pages = 20

# Wall-clock limit per post in seconds
# deadline_secs = 300

# Posts scraped at once
concurrency = 4
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
