use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Describes how to find repeating comment nodes and their fields.
///
/// Selectors are CSS. Every selector except `item` is evaluated relative to
/// the matched item element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectorSpec {
    pub item: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_attr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_attr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_attr: Option<String>,
}

impl SelectorSpec {
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            text: None,
            author: None,
            timestamp: None,
            timestamp_attr: None,
            id_attr: None,
            reply_to_attr: None,
        }
    }

    pub fn with_text(mut self, selector: impl Into<String>) -> Self {
        self.text = Some(selector.into());
        self
    }

    pub fn with_author(mut self, selector: impl Into<String>) -> Self {
        self.author = Some(selector.into());
        self
    }

    pub fn with_timestamp(mut self, selector: impl Into<String>, attr: Option<&str>) -> Self {
        self.timestamp = Some(selector.into());
        self.timestamp_attr = attr.map(String::from);
        self
    }

    pub fn with_id_attr(mut self, attr: impl Into<String>) -> Self {
        self.id_attr = Some(attr.into());
        self
    }

    pub fn with_reply_to_attr(mut self, attr: impl Into<String>) -> Self {
        self.reply_to_attr = Some(attr.into());
        self
    }

    /// Canonical form: whitespace collapsed, empty optionals dropped.
    ///
    /// Two specs are structurally equal when their normalized forms are equal.
    pub fn normalized(&self) -> Self {
        fn norm(s: &str) -> String {
            s.split_whitespace().collect::<Vec<_>>().join(" ")
        }
        fn norm_opt(s: &Option<String>) -> Option<String> {
            s.as_deref().map(norm).filter(|s| !s.is_empty())
        }

        Self {
            item: norm(&self.item),
            text: norm_opt(&self.text),
            author: norm_opt(&self.author),
            timestamp: norm_opt(&self.timestamp),
            timestamp_attr: norm_opt(&self.timestamp_attr),
            id_attr: norm_opt(&self.id_attr),
            reply_to_attr: norm_opt(&self.reply_to_attr),
        }
    }

    pub fn structurally_eq(&self, other: &SelectorSpec) -> bool {
        self.normalized() == other.normalized()
    }

    /// Every CSS selector carried by the spec, labelled by field
    pub fn selectors(&self) -> Vec<(&'static str, &str)> {
        let mut out = vec![("item", self.item.as_str())];
        if let Some(ref s) = self.text {
            out.push(("text", s));
        }
        if let Some(ref s) = self.author {
            out.push(("author", s));
        }
        if let Some(ref s) = self.timestamp {
            out.push(("timestamp", s));
        }
        out
    }
}

/// A learned extraction rule for one site shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub site_shape_id: String,
    pub selector_spec: SelectorSpec,
    pub confidence: f64,
    pub success_count: u32,
    pub failure_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl Pattern {
    pub fn new(site_shape_id: &str, selector_spec: SelectorSpec, confidence: f64) -> Self {
        let selector_spec = selector_spec.normalized();
        let now = Utc::now();
        Self {
            id: Self::generate_id(site_shape_id, &selector_spec),
            site_shape_id: site_shape_id.to_string(),
            selector_spec,
            confidence: confidence.clamp(0.0, 1.0),
            success_count: 0,
            failure_count: 0,
            created_at: now,
            last_used_at: now,
        }
    }

    /// Generate a deterministic ID from the shape and the normalized spec
    pub fn generate_id(site_shape_id: &str, spec: &SelectorSpec) -> String {
        let spec = spec.normalized();
        let mut hasher = Sha256::new();
        hasher.update(site_shape_id.as_bytes());
        for (field, value) in [
            ("item", Some(&spec.item)),
            ("text", spec.text.as_ref()),
            ("author", spec.author.as_ref()),
            ("timestamp", spec.timestamp.as_ref()),
            ("timestamp_attr", spec.timestamp_attr.as_ref()),
            ("id_attr", spec.id_attr.as_ref()),
            ("reply_to_attr", spec.reply_to_attr.as_ref()),
        ] {
            hasher.update([0u8]);
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
            if let Some(v) = value {
                hasher.update(v.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    pub fn attempts(&self) -> u32 {
        self.success_count + self.failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_collapses_whitespace() {
        let spec = SelectorSpec::new("  div[role=\"article\"]   >  div ")
            .with_text(" span.body ")
            .with_author("   ");
        let norm = spec.normalized();
        assert_eq!(norm.item, "div[role=\"article\"] > div");
        assert_eq!(norm.text.as_deref(), Some("span.body"));
        assert_eq!(norm.author, None);
    }

    #[test]
    fn test_structural_equality_ignores_formatting() {
        let a = SelectorSpec::new("div.comment").with_text("p");
        let b = SelectorSpec::new(" div.comment ").with_text("p ");
        let c = SelectorSpec::new("div.comment").with_text("span");
        assert!(a.structurally_eq(&b));
        assert!(!a.structurally_eq(&c));
    }

    #[test]
    fn test_id_stable_across_formatting() {
        let a = SelectorSpec::new("div.comment").with_text("p");
        let b = SelectorSpec::new("div.comment  ").with_text(" p");
        assert_eq!(
            Pattern::generate_id("shape-1", &a),
            Pattern::generate_id("shape-1", &b)
        );
        assert_ne!(
            Pattern::generate_id("shape-1", &a),
            Pattern::generate_id("shape-2", &a)
        );
    }

    #[test]
    fn test_id_distinguishes_fields() {
        let a = SelectorSpec::new("div.comment").with_text("p");
        let b = SelectorSpec::new("div.comment").with_author("p");
        assert_ne!(
            Pattern::generate_id("shape", &a),
            Pattern::generate_id("shape", &b)
        );
    }

    #[test]
    fn test_new_pattern_clamps_confidence() {
        let p = Pattern::new("shape", SelectorSpec::new("li"), 1.7);
        assert_eq!(p.confidence, 1.0);
        assert_eq!(p.attempts(), 0);
    }

    #[test]
    fn test_spec_json_omits_empty_fields() {
        let spec = SelectorSpec::new("li.comment");
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, r#"{"item":"li.comment"}"#);

        let parsed: SelectorSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, spec);
    }
}
