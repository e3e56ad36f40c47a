use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::browser::default_load_more_labels;

/// Configuration for the direct-request fetch and the fetch retry loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// User agent for direct requests
    pub user_agent: String,

    /// Bodies shorter than this are treated as empty (default: 2048)
    pub min_body_bytes: usize,

    /// Markers whose presence in a 200 response means a login wall or block page
    pub block_markers: Vec<String>,

    /// Anchor labels that identify a "more comments" link in static markup
    pub load_more_labels: Vec<String>,

    /// Fetch attempts per page before giving up (default: 3)
    pub max_attempts: u32,

    /// Base delay between fetch attempts in milliseconds, doubled per attempt (default: 2000)
    pub retry_backoff_ms: u64,

    /// Upper bound on the delay between fetch attempts in milliseconds (default: 10000)
    pub max_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            min_body_bytes: 2048,
            block_markers: vec![
                "id=\"login_form\"".to_string(),
                "/checkpoint/".to_string(),
                "You must log in to continue".to_string(),
            ],
            load_more_labels: default_load_more_labels(),
            max_attempts: 3,
            retry_backoff_ms: 2000,
            max_backoff_ms: 10_000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = self.retry_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.min_body_bytes, 2048);
        assert_eq!(config.max_attempts, 3);
        assert!(!config.block_markers.is_empty());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = FetchConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(2000));
        assert_eq!(config.backoff(1), Duration::from_millis(4000));
        assert_eq!(config.backoff(2), Duration::from_millis(8000));
        assert_eq!(config.backoff(3), Duration::from_millis(10_000));
        assert_eq!(config.backoff(40), Duration::from_millis(10_000));
    }
}
