use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One comment extracted from a page fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub timestamp_raw: Option<String>,
    pub source_id: Option<String>,
    pub reply_to: Option<String>,
    pub raw_fingerprint: String,
}

impl Comment {
    pub fn new(text: impl Into<String>, fragment_text: &str) -> Self {
        Self {
            author: String::new(),
            text: text.into(),
            timestamp: None,
            timestamp_raw: None,
            source_id: None,
            reply_to: None,
            raw_fingerprint: Self::fingerprint(fragment_text),
        }
    }

    /// Deterministic fingerprint of a fragment's normalized text
    pub fn fingerprint(fragment_text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(fragment_text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Identifier used by replies to point at this comment
    pub fn identifier(&self) -> &str {
        self.source_id.as_deref().unwrap_or(&self.raw_fingerprint)
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }
}
