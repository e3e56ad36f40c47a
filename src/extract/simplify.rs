use scraper::{ElementRef, Html, Node};

const DROPPED_TAGS: &[&str] = &[
    "script", "style", "svg", "noscript", "template", "iframe", "head", "link", "meta", "img",
    "video", "picture", "canvas",
];
const KEPT_ATTRS: &[&str] = &["id", "class", "role", "aria-label", "datetime", "href", "title"];
const MAX_ATTR_CHARS: usize = 60;
const MAX_TEXT_CHARS: usize = 80;
/// Consecutive siblings with the same signature kept before eliding the rest
const MAX_REPEATS: usize = 4;

/// Truncate to at most `max_bytes` without splitting a character
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

fn clip(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Structural rendering of `body` for a language model prompt.
///
/// Scripts, styles and media are dropped. Only structural attributes
/// survive, text is clipped, and long runs of identical siblings are elided.
/// The result never exceeds `max_chars` bytes.
pub fn simplify_for_model(body: &str, max_chars: usize) -> String {
    let document = Html::parse_document(body);
    let mut out = String::new();
    render(document.root_element(), &mut out);
    truncate_to_char_boundary(&out, max_chars).to_string()
}

fn signature(el: ElementRef) -> (String, Option<String>) {
    (
        el.value().name().to_string(),
        el.value().attr("class").map(String::from),
    )
}

fn render(el: ElementRef, out: &mut String) {
    let name = el.value().name();
    out.push('<');
    out.push_str(name);
    let mut attrs: Vec<(&str, &str)> = el
        .value()
        .attrs()
        .filter(|(attr, _)| KEPT_ATTRS.contains(attr) || attr.starts_with("data-"))
        .collect();
    attrs.sort_unstable();
    for (attr, value) in attrs {
        let value = clip(value.trim(), MAX_ATTR_CHARS);
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(&value));
        out.push('"');
    }
    out.push('>');

    let mut last_sig = None;
    let mut repeats = 0;
    let mut elided = 0;

    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    out.push_str(&html_escape::encode_text(&clip(&text, MAX_TEXT_CHARS)));
                }
            }
            Node::Element(element) => {
                if DROPPED_TAGS.contains(&element.name()) {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let sig = signature(child_el);
                if last_sig.as_ref() == Some(&sig) {
                    repeats += 1;
                } else {
                    if elided > 0 {
                        out.push_str(&format!("<!-- {} more -->", elided));
                        elided = 0;
                    }
                    repeats = 1;
                    last_sig = Some(sig);
                }
                if repeats > MAX_REPEATS {
                    elided += 1;
                    continue;
                }
                render(child_el, out);
            }
            _ => {}
        }
    }
    if elided > 0 {
        out.push_str(&format!("<!-- {} more -->", elided));
    }

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}
