use scraper::{ElementRef, Html};
use sha2::{Digest, Sha256};
use url::Url;

const IGNORED_TAGS: &[&str] = &["script", "style", "noscript", "template", "link", "meta"];

/// Fingerprint of a page layout.
///
/// Hashes the host together with a tag/role outline of the document down to
/// `depth` levels. Children of a container that repeats an element collapse
/// into the set of their distinct outlines, so the same layout keeps its shape
/// whatever the number, order or mix of comment variants.
pub fn site_shape(url: &str, body: &str, depth: usize) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
        .unwrap_or_default();

    let document = Html::parse_document(body);
    let skeleton = outline(document.root_element(), depth);

    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    hasher.update(b"|");
    hasher.update(skeleton.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

fn label(el: ElementRef) -> String {
    let name = el.value().name();
    match el.value().attr("role") {
        Some(role) if !role.trim().is_empty() => format!("{}[{}]", name, role.trim()),
        _ => name.to_string(),
    }
}

fn outline(el: ElementRef, depth: usize) -> String {
    let mut out = label(el);
    if depth == 0 {
        return out;
    }

    let children: Vec<ElementRef> = el
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| !IGNORED_TAGS.contains(&child.value().name()))
        .collect();

    let mut labels: Vec<String> = children.iter().map(|c| label(*c)).collect();
    labels.sort();
    let is_list = labels.windows(2).any(|pair| pair[0] == pair[1]);

    let mut subs: Vec<String> = children
        .into_iter()
        .map(|child| outline(child, depth - 1))
        .collect();
    if is_list {
        // Repeated containers hold items in any order and mix of variants
        subs.sort();
    }
    subs.dedup();

    if !subs.is_empty() {
        out.push('(');
        out.push_str(&subs.join(","));
        out.push(')');
    }
    out
}
