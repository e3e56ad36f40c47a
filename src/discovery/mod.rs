//! Proposing new extraction patterns when no stored pattern matches.
//!
//! [`AiDiscoverer`] asks a [`LanguageModel`] for candidate selector specs,
//! bounded by a shared [`RateLimiter`] and a retry policy for transient
//! failures. Candidates are validated before they leave this module.

mod config;
mod gemini;
mod limiter;
mod model;
pub mod retry;

pub use config::AiConfig;
pub use gemini::GeminiClient;
pub use limiter::{RateLimiter, RateLimits};
pub use model::{LanguageModel, ModelError};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::app::{MurmurError, Result};
use crate::domain::SelectorSpec;
use crate::extract::{simplify_for_model, CompiledSpec};

/// A field the model should locate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// What the discoverer is asked to find
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSchema {
    pub fields: Vec<SchemaField>,
}

impl Default for TargetSchema {
    fn default() -> Self {
        Self {
            fields: vec![
                SchemaField {
                    name: "item",
                    description: "CSS selector matching every individual comment container, once per comment",
                    required: true,
                },
                SchemaField {
                    name: "text",
                    description: "selector, relative to the item, for the comment body",
                    required: false,
                },
                SchemaField {
                    name: "author",
                    description: "selector, relative to the item, for the author name",
                    required: false,
                },
                SchemaField {
                    name: "timestamp",
                    description: "selector, relative to the item, for the posting time",
                    required: false,
                },
                SchemaField {
                    name: "timestamp_attr",
                    description: "attribute holding a machine-readable time, e.g. datetime or data-utime",
                    required: false,
                },
                SchemaField {
                    name: "id_attr",
                    description: "attribute on the item holding a stable comment id",
                    required: false,
                },
                SchemaField {
                    name: "reply_to_attr",
                    description: "attribute on the item holding the parent comment id for replies",
                    required: false,
                },
            ],
        }
    }
}

impl TargetSchema {
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                format!(
                    "- \"{}\" ({}): {}",
                    f.name,
                    if f.required { "required" } else { "optional" },
                    f.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Input size allowance for one discovery call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_input_tokens: u32,
}

impl Budget {
    pub fn new(max_input_tokens: u32) -> Self {
        Self { max_input_tokens }
    }

    pub fn max_chars(&self) -> usize {
        self.max_input_tokens as usize * 4
    }
}

/// Rough token count at four characters per token
pub fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len().div_ceil(4)).unwrap_or(u32::MAX)
}

/// Source of candidate selector specs for a page
#[async_trait]
pub trait PatternDiscoverer: Send + Sync {
    async fn discover(
        &self,
        body: &str,
        schema: &TargetSchema,
        budget: &Budget,
    ) -> Result<Vec<SelectorSpec>>;

    /// Discover for a layout whose stored patterns (`stale`) just stopped
    /// matching. Implementations may use them as a hint.
    async fn rediscover(
        &self,
        body: &str,
        schema: &TargetSchema,
        budget: &Budget,
        _stale: &[SelectorSpec],
    ) -> Result<Vec<SelectorSpec>> {
        self.discover(body, schema, budget).await
    }
}

/// Used when no model is configured
pub struct DisabledDiscoverer;

#[async_trait]
impl PatternDiscoverer for DisabledDiscoverer {
    async fn discover(
        &self,
        _body: &str,
        _schema: &TargetSchema,
        _budget: &Budget,
    ) -> Result<Vec<SelectorSpec>> {
        debug!("Pattern discovery disabled");
        Ok(Vec::new())
    }
}

const PROMPT_HEADER: &str = "You are given the simplified HTML structure of a social media post page.\n\
Propose CSS selector patterns that extract the comments on the post.\n\
Respond with a JSON array of objects, best pattern first, using these keys:\n";

const STALE_HEADER: &str =
    "These patterns matched this layout before and no longer do; the markup has changed:\n";

/// Stale patterns quoted in a prompt
const MAX_STALE_IN_PROMPT: usize = 3;

const PROMPT_FOOTER: &str = "\nOmit keys you cannot determine. Do not select the post itself.\n\
Return at most a few alternatives. HTML:\n";

pub struct AiDiscoverer {
    model: Arc<dyn LanguageModel>,
    limiter: Arc<RateLimiter>,
    config: AiConfig,
}

impl AiDiscoverer {
    pub fn new(model: Arc<dyn LanguageModel>, limiter: Arc<RateLimiter>, config: AiConfig) -> Self {
        Self {
            model,
            limiter,
            config,
        }
    }

    fn build_prompt(
        &self,
        body: &str,
        schema: &TargetSchema,
        budget: &Budget,
        stale: &[SelectorSpec],
    ) -> String {
        let description = schema.describe();
        let base = PROMPT_HEADER.len() + description.len() + PROMPT_FOOTER.len();

        let mut previous = String::new();
        if !stale.is_empty() {
            let quoted = &stale[..stale.len().min(MAX_STALE_IN_PROMPT)];
            if let Ok(json) = serde_json::to_string(quoted) {
                previous = format!("\n{}{}\n", STALE_HEADER, json);
            }
            // The page itself matters more than the hint
            if base + previous.len() > budget.max_chars() / 2 {
                previous.clear();
            }
        }

        let body_chars = budget.max_chars().saturating_sub(base + previous.len());
        let simplified = simplify_for_model(body, body_chars);

        format!(
            "{}{}{}{}{}",
            PROMPT_HEADER, description, previous, PROMPT_FOOTER, simplified
        )
    }

    /// Parse a model response into validated, distinct candidates
    fn parse_candidates(&self, response: &str) -> Vec<SelectorSpec> {
        let Some(value) = parse_json_payload(response) else {
            warn!("Model response holds no JSON");
            return Vec::new();
        };

        let entries = match value {
            serde_json::Value::Array(entries) => entries,
            serde_json::Value::Object(mut object) => match object.remove("patterns") {
                Some(serde_json::Value::Array(entries)) => entries,
                _ => vec![serde_json::Value::Object(object)],
            },
            other => {
                warn!("Unexpected model response shape: {}", other);
                return Vec::new();
            }
        };

        let mut candidates: Vec<SelectorSpec> = Vec::new();
        for entry in entries {
            let spec: SelectorSpec = match serde_json::from_value(entry) {
                Ok(spec) => spec,
                Err(e) => {
                    warn!("Discarding malformed candidate: {}", e);
                    continue;
                }
            };
            if let Err(e) = CompiledSpec::compile(&spec) {
                warn!("Discarding invalid candidate {:?}: {}", spec.item, e);
                continue;
            }
            let spec = spec.normalized();
            if candidates.iter().any(|c| c.structurally_eq(&spec)) {
                continue;
            }
            candidates.push(spec);
            if candidates.len() >= self.config.max_candidates {
                break;
            }
        }
        candidates
    }

    /// Submit a prompt under the rate limiter, retrying transient failures
    async fn ask(&self, prompt: String) -> Result<Vec<SelectorSpec>> {
        let tokens = estimate_tokens(&prompt);
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            self.limiter.acquire(tokens).await?;

            match self.model.generate(&prompt).await {
                Ok(response) => {
                    let candidates = self.parse_candidates(&response);
                    info!(
                        model = self.model.name(),
                        candidates = candidates.len(),
                        "Model proposed patterns"
                    );
                    return Ok(candidates);
                }
                Err(ModelError::Fatal(message)) => {
                    return Err(MurmurError::Service(message));
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt + 1 >= max_attempts {
                        break;
                    }
                    let delay = match e {
                        ModelError::RateLimited {
                            retry_after: Some(delay),
                        } => delay,
                        _ => retry::with_jitter(retry::backoff_delay(
                            attempt,
                            self.config.base_backoff_ms,
                            self.config.max_backoff_ms,
                        )),
                    };
                    warn!(
                        "Model call failed (attempt {}/{}): {}, retrying in {:?}",
                        attempt + 1,
                        max_attempts,
                        last_error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(MurmurError::TransientService {
            attempts: max_attempts,
            message: last_error,
        })
    }
}

#[async_trait]
impl PatternDiscoverer for AiDiscoverer {
    async fn discover(
        &self,
        body: &str,
        schema: &TargetSchema,
        budget: &Budget,
    ) -> Result<Vec<SelectorSpec>> {
        self.ask(self.build_prompt(body, schema, budget, &[])).await
    }

    async fn rediscover(
        &self,
        body: &str,
        schema: &TargetSchema,
        budget: &Budget,
        stale: &[SelectorSpec],
    ) -> Result<Vec<SelectorSpec>> {
        debug!("Asking for new patterns with {} stale ones as context", stale.len());
        self.ask(self.build_prompt(body, schema, budget, stale)).await
    }
}


/// Find the JSON payload in a response, tolerating code fences and prose
/// around an array or object
fn parse_json_payload(response: &str) -> Option<serde_json::Value> {
    let cleaned = strip_code_blocks(response);
    if let Ok(value) = serde_json::from_str(cleaned) {
        return Some(value);
    }

    [('[', ']'), ('{', '}')].iter().find_map(|&(open, close)| {
        let start = cleaned.find(open)?;
        let end = cleaned.rfind(close)?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&cleaned[start..=end]).ok()
    })
}

/// Strip markdown code fences from a response
fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
