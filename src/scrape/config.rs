use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-session limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Comments collected before a session stops (default: 100)
    pub max_comments: usize,

    /// Pages followed per session (default: 20)
    pub max_pages: u32,

    /// Wall-clock limit per session in seconds
    pub deadline_secs: Option<u64>,

    /// Sessions run at once by a batch scrape (default: 4)
    pub concurrency: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_comments: 100,
            max_pages: 20,
            deadline_secs: None,
            concurrency: 4,
        }
    }
}

impl SessionConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}
