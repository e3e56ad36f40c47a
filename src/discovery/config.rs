use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::RateLimits;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    pub model: String,
    pub api_base: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    pub tokens_per_minute: u32,
    /// Input budget for one discovery prompt
    pub max_input_tokens: u32,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_candidates: usize,
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-1.5-pro".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            requests_per_minute: 15,
            requests_per_day: 1500,
            tokens_per_minute: 32_000,
            max_input_tokens: 8_000,
            max_attempts: 4,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            max_candidates: 5,
            request_timeout_secs: 60,
        }
    }
}

impl AiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            requests_per_minute: self.requests_per_minute,
            requests_per_day: self.requests_per_day,
            tokens_per_minute: self.tokens_per_minute,
        }
    }

    /// The API key, if the configured variable is set and non-empty
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}
