use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single model call, classified for the retry policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Timeouts, connection failures and 5xx responses
    #[error("transient model failure: {0}")]
    Transient(String),

    #[error("rate limited by model service")]
    RateLimited { retry_after: Option<Duration> },

    /// Auth failures, bad requests, missing keys
    #[error("model request rejected: {0}")]
    Fatal(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, ModelError::Fatal(_))
    }
}

/// A text-in, text-out generative model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> std::result::Result<String, ModelError>;
}
