use std::collections::HashSet;

use tokio::time::Instant;
use tracing::debug;

use crate::domain::{Comment, FailureReason, ScrapeReport, SessionState};

/// Working state of one `scrape` call
pub(crate) struct ScrapeSession {
    pub url: String,
    pub max_comments: usize,
    pub collected: Vec<Comment>,
    seen_fingerprints: HashSet<String>,
    pub state: SessionState,
    pub site_shape: Option<String>,
    pub fetch_attempts: u32,
    pub patterns_tried: u32,
    pub ai_invocations: u32,
    pub pages: u32,
    started: Instant,
}

impl ScrapeSession {
    pub fn new(url: &str, max_comments: usize) -> Self {
        Self {
            url: url.to_string(),
            max_comments,
            collected: Vec::new(),
            seen_fingerprints: HashSet::new(),
            state: SessionState::Init,
            site_shape: None,
            fetch_attempts: 0,
            patterns_tried: 0,
            ai_invocations: 0,
            pages: 0,
            started: Instant::now(),
        }
    }

    pub fn transition(&mut self, next: SessionState) {
        debug!(url = %self.url, from = ?self.state, to = ?next, "Session transition");
        self.state = next;
    }

    pub fn is_full(&self) -> bool {
        self.collected.len() >= self.max_comments
    }

    /// Append unseen comments in order, stopping at the cap. Returns how many
    /// were added.
    pub fn absorb(&mut self, comments: Vec<Comment>) -> usize {
        let before = self.collected.len();
        for comment in comments {
            if self.is_full() {
                break;
            }
            if self.seen_fingerprints.insert(comment.raw_fingerprint.clone()) {
                self.collected.push(comment);
            }
        }
        self.collected.len() - before
    }

    pub fn finish(mut self, failure: Option<FailureReason>, cancelled: bool) -> ScrapeReport {
        let state = if failure.is_some() {
            SessionState::Failed
        } else {
            SessionState::Done
        };
        self.transition(state);

        ScrapeReport {
            url: self.url,
            state,
            failure,
            cancelled,
            comments: self.collected,
            pages_fetched: self.pages,
            fetch_attempts: self.fetch_attempts,
            patterns_tried: self.patterns_tried,
            ai_invocations: self.ai_invocations,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(text: &str) -> Comment {
        Comment::new(text, text)
    }

    #[test]
    fn test_absorb_dedupes_and_caps() {
        let mut session = ScrapeSession::new("https://example.com/p", 3);
        assert_eq!(session.absorb(vec![comment("a"), comment("b"), comment("a")]), 2);
        assert_eq!(session.absorb(vec![comment("b"), comment("c"), comment("d")]), 1);
        assert!(session.is_full());

        let texts: Vec<&str> = session.collected.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_finish_sets_terminal_state() {
        let session = ScrapeSession::new("https://example.com/p", 3);
        let report = session.finish(Some(FailureReason::NoPatternFound), false);
        assert_eq!(report.state, SessionState::Failed);

        let session = ScrapeSession::new("https://example.com/p", 3);
        let report = session.finish(None, true);
        assert_eq!(report.state, SessionState::Done);
        assert!(report.cancelled);
    }
}
