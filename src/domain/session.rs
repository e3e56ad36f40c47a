use serde::{Deserialize, Serialize};

use crate::domain::Comment;

/// Orchestrator states. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Fetching,
    Matching,
    Extracting,
    AiDiscovering,
    Learning,
    Paginating,
    Done,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

/// Why a session ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    FetchExhausted,
    NoPatternFound,
    QuotaExhausted,
    Fatal(String),
}

/// Outcome of one scrape session, handed to the result consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeReport {
    pub url: String,
    pub state: SessionState,
    pub failure: Option<FailureReason>,
    pub cancelled: bool,
    pub comments: Vec<Comment>,
    pub pages_fetched: u32,
    pub fetch_attempts: u32,
    pub patterns_tried: u32,
    pub ai_invocations: u32,
    pub elapsed_ms: u64,
}

impl ScrapeReport {
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Done
    }

    /// Failed sessions that the caller may retry later rather than treat as
    /// unrecognized markup.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.failure,
            Some(FailureReason::QuotaExhausted) | Some(FailureReason::FetchExhausted)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Done.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Paginating.is_terminal());
        assert!(!SessionState::Init.is_terminal());
    }

    #[test]
    fn test_failure_reason_serialization() {
        let json = serde_json::to_string(&FailureReason::QuotaExhausted).unwrap();
        assert_eq!(json, r#"{"kind":"quota_exhausted"}"#);

        let json = serde_json::to_string(&FailureReason::Fatal("boom".into())).unwrap();
        assert_eq!(json, r#"{"kind":"fatal","detail":"boom"}"#);
    }

    #[test]
    fn test_retryable_failures() {
        let mut report = ScrapeReport {
            url: "https://example.com/post/1".into(),
            state: SessionState::Failed,
            failure: Some(FailureReason::QuotaExhausted),
            cancelled: false,
            comments: Vec::new(),
            pages_fetched: 1,
            fetch_attempts: 1,
            patterns_tried: 0,
            ai_invocations: 1,
            elapsed_ms: 10,
        };
        assert!(report.is_retryable());
        assert!(!report.is_success());

        report.failure = Some(FailureReason::NoPatternFound);
        assert!(!report.is_retryable());
    }
}
