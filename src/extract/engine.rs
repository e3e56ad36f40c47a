use std::collections::{HashMap, HashSet};

use scraper::{ElementRef, Html, Node, Selector};

use crate::app::{MurmurError, Result};
use crate::domain::{Comment, SelectorSpec};
use crate::extract::text::{normalize_whitespace, parse_timestamp, strip_noise};
use crate::extract::ExtractConfig;

/// Selector strings that would select the whole document rather than a
/// repeating item
const DOCUMENT_SELECTORS: &[&str] = &["*", "html", "body", "head", ":root"];

const MAX_SELECTOR_LEN: usize = 512;

/// A selector spec with its CSS selectors parsed
pub struct CompiledSpec {
    item: Selector,
    text: Option<Selector>,
    author: Option<Selector>,
    timestamp: Option<Selector>,
    spec: SelectorSpec,
}

impl CompiledSpec {
    /// Parse and sanity-check every selector in the spec
    pub fn compile(spec: &SelectorSpec) -> Result<Self> {
        let spec = spec.normalized();

        if spec.item.is_empty() {
            return Err(MurmurError::InvalidSelector("item selector is empty".into()));
        }
        if DOCUMENT_SELECTORS.contains(&spec.item.to_lowercase().as_str()) {
            return Err(MurmurError::InvalidSelector(format!(
                "item selector '{}' selects the whole document",
                spec.item
            )));
        }
        for (field, selector) in spec.selectors() {
            if selector.len() > MAX_SELECTOR_LEN {
                return Err(MurmurError::InvalidSelector(format!(
                    "{} selector is longer than {} characters",
                    field, MAX_SELECTOR_LEN
                )));
            }
        }
        for (field, attr) in [
            ("timestamp_attr", &spec.timestamp_attr),
            ("id_attr", &spec.id_attr),
            ("reply_to_attr", &spec.reply_to_attr),
        ] {
            if let Some(attr) = attr {
                if attr.contains(char::is_whitespace) || attr.contains(['"', '\'', '=', '<', '>']) {
                    return Err(MurmurError::InvalidSelector(format!(
                        "{} '{}' is not an attribute name",
                        field, attr
                    )));
                }
            }
        }

        Ok(Self {
            item: parse_selector("item", &spec.item)?,
            text: spec.text.as_deref().map(|s| parse_selector("text", s)).transpose()?,
            author: spec
                .author
                .as_deref()
                .map(|s| parse_selector("author", s))
                .transpose()?,
            timestamp: spec
                .timestamp
                .as_deref()
                .map(|s| parse_selector("timestamp", s))
                .transpose()?,
            spec,
        })
    }

    pub fn spec(&self) -> &SelectorSpec {
        &self.spec
    }
}

fn parse_selector(field: &str, selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| {
        MurmurError::InvalidSelector(format!("{} selector '{}': {:?}", field, selector, e))
    })
}

/// Applies selector specs to page bodies
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractConfig,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractConfig::default())
    }
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Extract every comment the spec locates in `body`.
    ///
    /// An empty vector means the spec did not match. Errors only when the
    /// spec itself is malformed.
    pub fn extract(&self, body: &str, spec: &SelectorSpec) -> Result<Vec<Comment>> {
        let compiled = CompiledSpec::compile(spec)?;
        Ok(self.extract_compiled(body, &compiled))
    }

    pub fn extract_compiled(&self, body: &str, compiled: &CompiledSpec) -> Vec<Comment> {
        let document = Html::parse_document(body);
        let items: Vec<ElementRef> = document.select(&compiled.item).collect();
        let item_ids: HashSet<_> = items.iter().map(|item| item.id()).collect();
        let is_item = |el: &ElementRef| item_ids.contains(&el.id());

        let spec = compiled.spec();
        let mut identifiers = HashMap::new();
        let mut comments = Vec::new();

        for item in items.iter().copied() {
            let fragment_text = own_text(item, &is_item);

            let text = match compiled.text {
                Some(ref selector) => {
                    let parts: Vec<String> = item
                        .select(selector)
                        .filter(|el| owned_by(*el, item, &is_item))
                        .map(|el| own_text(el, &is_item))
                        .collect();
                    normalize_whitespace(parts.iter().map(String::as_str))
                }
                None => fragment_text.clone(),
            };
            let text = strip_noise(&text, &self.config.noise_phrases);
            if text.is_empty() {
                continue;
            }

            let mut comment = Comment::new(text, &fragment_text);

            if let Some(ref selector) = compiled.author {
                if let Some(el) = first_owned(item, selector, &is_item) {
                    comment.author = own_text(el, &is_item);
                }
            }

            let timestamp_source = match compiled.timestamp {
                Some(ref selector) => first_owned(item, selector, &is_item),
                None if spec.timestamp_attr.is_some() => Some(item),
                None => None,
            };
            if let Some(el) = timestamp_source {
                let raw = match spec.timestamp_attr {
                    Some(ref attr) => el.value().attr(attr).map(|v| v.trim().to_string()),
                    None => Some(own_text(el, &is_item)),
                };
                if let Some(raw) = raw.filter(|r| !r.is_empty()) {
                    comment.timestamp = parse_timestamp(&raw);
                    comment.timestamp_raw = Some(raw);
                }
            }

            if let Some(ref attr) = spec.id_attr {
                comment.source_id = item
                    .value()
                    .attr(attr)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
            }

            comment.reply_to = match spec.reply_to_attr {
                Some(ref attr) => item
                    .value()
                    .attr(attr)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty()),
                None => item
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .find_map(|ancestor| identifiers.get(&ancestor.id()).cloned()),
            };

            identifiers.insert(item.id(), comment.identifier().to_string());
            comments.push(comment);
        }

        comments
    }
}

/// Text of `el`, skipping scripts and any nested comment items
fn own_text(el: ElementRef, is_item: &dyn Fn(&ElementRef) -> bool) -> String {
    fn collect<'a>(
        el: ElementRef<'a>,
        is_item: &dyn Fn(&ElementRef) -> bool,
        parts: &mut Vec<&'a str>,
    ) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => parts.push(text),
                Node::Element(element) => {
                    if matches!(element.name(), "script" | "style" | "noscript" | "template") {
                        continue;
                    }
                    if let Some(child_el) = ElementRef::wrap(child) {
                        if !is_item(&child_el) {
                            collect(child_el, is_item, parts);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    let mut parts = Vec::new();
    collect(el, is_item, &mut parts);
    normalize_whitespace(parts)
}

/// Whether `el` belongs to `item` rather than to a comment nested inside it
fn owned_by(el: ElementRef, item: ElementRef, is_item: &dyn Fn(&ElementRef) -> bool) -> bool {
    if el.id() == item.id() {
        return true;
    }
    for ancestor in el.ancestors().filter_map(ElementRef::wrap) {
        if ancestor.id() == item.id() {
            return true;
        }
        if is_item(&ancestor) {
            return false;
        }
    }
    false
}

fn first_owned<'a>(
    item: ElementRef<'a>,
    selector: &Selector,
    is_item: &dyn Fn(&ElementRef) -> bool,
) -> Option<ElementRef<'a>> {
    item.select(selector).find(|el| owned_by(*el, item, is_item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const THREAD: &str = r#"
        <html><body>
          <div class="post">Original post text that is not a comment</div>
          <ul class="comments">
            <li class="comment" data-id="c1" data-time="2024-05-01T10:00:00Z">
              <a class="author">Alice</a>
              <p class="body">First!   Great   post.</p>
              <span class="actions">Like Reply</span>
              <ul>
                <li class="comment" data-id="c2">
                  <a class="author">Bob</a>
                  <p class="body">Replying to Alice</p>
                </li>
              </ul>
            </li>
            <li class="comment" data-id="c3">
              <a class="author">Carol</a>
              <p class="body">   </p>
            </li>
            <li class="comment">
              <a class="author">Dave</a>
              <p class="body">No id here</p>
              <time datetime="1714557600">yesterday</time>
            </li>
          </ul>
        </body></html>
    "#;

    fn spec() -> SelectorSpec {
        SelectorSpec::new("li.comment")
            .with_text("p.body")
            .with_author("a.author")
            .with_id_attr("data-id")
    }

    #[test]
    fn test_extracts_fields_in_document_order() {
        let comments = Extractor::default().extract(THREAD, &spec()).unwrap();

        let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["First! Great post.", "Replying to Alice", "No id here"]);
        assert_eq!(comments[0].author, "Alice");
        assert_eq!(comments[1].author, "Bob");
        assert_eq!(comments[0].source_id.as_deref(), Some("c1"));
        assert_eq!(comments[2].source_id, None);
    }

    #[test]
    fn test_nested_item_replies_to_ancestor() {
        let comments = Extractor::default().extract(THREAD, &spec()).unwrap();
        assert_eq!(comments[0].reply_to, None);
        assert_eq!(comments[1].reply_to.as_deref(), Some("c1"));
        assert_eq!(comments[2].reply_to, None);
    }

    #[test]
    fn test_parent_text_excludes_nested_replies() {
        let spec = SelectorSpec::new("li.comment");
        let comments = Extractor::default().extract(THREAD, &spec).unwrap();
        assert!(comments[0].text.starts_with("Alice First!"));
        assert!(!comments[0].text.contains("Replying"));
        // Trailing controls stripped
        assert!(comments[0].text.ends_with("Great post."));
    }

    #[test]
    fn test_timestamp_from_attribute() {
        let spec = spec().with_timestamp("time", Some("datetime"));
        let comments = Extractor::default().extract(THREAD, &spec).unwrap();
        let dave = comments.iter().find(|c| c.author == "Dave").unwrap();
        assert_eq!(dave.timestamp_raw.as_deref(), Some("1714557600"));
        assert_eq!(dave.timestamp.unwrap().timestamp(), 1_714_557_600);
    }

    #[test]
    fn test_timestamp_attr_on_item() {
        let mut spec = spec();
        spec.timestamp_attr = Some("data-time".into());
        let comments = Extractor::default().extract(THREAD, &spec).unwrap();
        assert_eq!(
            comments[0].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(comments[1].timestamp, None);
    }

    #[test]
    fn test_reply_to_attr_overrides_nesting() {
        let body = r#"
            <div class="c" data-id="a"><span>top level</span></div>
            <div class="c" data-id="b" data-parent="a"><span>flat reply</span></div>
        "#;
        let spec = SelectorSpec::new("div.c")
            .with_id_attr("data-id")
            .with_reply_to_attr("data-parent");
        let comments = Extractor::default().extract(body, &spec).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[1].reply_to.as_deref(), Some("a"));
    }

    #[test]
    fn test_no_match_is_empty() {
        let spec = SelectorSpec::new("div.does-not-exist");
        let comments = Extractor::default().extract(THREAD, &spec).unwrap();
        assert!(comments.is_empty());
    }

    #[test]
    fn test_invalid_spec_errors() {
        let bad = SelectorSpec::new("li[[[");
        assert!(matches!(
            Extractor::default().extract(THREAD, &bad),
            Err(MurmurError::InvalidSelector(_))
        ));

        let whole_doc = SelectorSpec::new("body");
        assert!(matches!(
            Extractor::default().extract(THREAD, &whole_doc),
            Err(MurmurError::InvalidSelector(_))
        ));

        let bad_attr = SelectorSpec::new("li").with_id_attr("data id");
        assert!(matches!(
            Extractor::default().extract(THREAD, &bad_attr),
            Err(MurmurError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let extractor = Extractor::default();
        let first = extractor.extract(THREAD, &spec()).unwrap();
        let second = extractor.extract(THREAD, &spec()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fingerprints_distinct_per_fragment() {
        let comments = Extractor::default().extract(THREAD, &spec()).unwrap();
        let fingerprints: HashSet<&str> =
            comments.iter().map(|c| c.raw_fingerprint.as_str()).collect();
        assert_eq!(fingerprints.len(), comments.len());
    }
}
