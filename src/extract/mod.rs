//! Turning page bodies into comments.
//!
//! The [`Extractor`] applies a [`SelectorSpec`](crate::domain::SelectorSpec)
//! to markup. [`site_shape`] fingerprints a page layout so learned patterns can
//! be reused, and [`simplify_for_model`] shrinks a page for a model prompt.

mod engine;
mod shape;
mod simplify;
pub mod text;

pub use engine::{CompiledSpec, Extractor};
pub use shape::site_shape;
pub use simplify::{simplify_for_model, truncate_to_char_boundary};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Interface labels removed from either end of comment text
    pub noise_phrases: Vec<String>,
    /// Levels of the document outline hashed into the site shape
    pub shape_depth: usize,
    /// Common comment containers tried on a layout with no working pattern
    /// before asking the model
    pub seed_selectors: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            noise_phrases: ["Like", "Reply", "Share", "See Translation", "Edited"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            shape_depth: 8,
            seed_selectors: [
                r#"div[role="article"]"#,
                r#"div[data-testid="comment"]"#,
                r#"div[data-testid="UFI2Comment"]"#,
                "div.UFICommentContent",
                "div.UFIComment",
                "div._4eek",
                "div.comment",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}
