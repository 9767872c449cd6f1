//! HTML to plain text for summarization prompts.

use html_scraper::{Html, Node};

/// Elements whose text must never reach the prompt.
///
/// html5ever parses with scripting enabled, so `<noscript>` content arrives as one raw
/// text node holding markup (tracking iframes and the like).
const DROPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Concatenated document text with script/style/noscript content removed.
fn raw_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);
    for node in doc.tree.root().descendants() {
        let Node::Text(t) = node.value() else {
            continue;
        };
        let dropped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| DROPPED_ELEMENTS.contains(&el.name()))
        });
        if !dropped {
            out.push_str(t);
        }
    }
    out
}

/// Normalize extracted text: one phrase per line, no blank lines.
///
/// Lines are trimmed and additionally split on double spaces, which is how stacked
/// headlines usually survive tag stripping.
pub fn normalize_lines(text: &str) -> String {
    text.lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert raw HTML into normalized plain text.
///
/// Never fails: malformed markup degrades to whatever text the parser recovers. May return
/// an empty string.
pub fn html_to_text(html: &str) -> String {
    normalize_lines(&raw_text(html))
}
