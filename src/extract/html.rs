//! HTML to text extraction.
//!
//! Parses the document, prefers `<main>` then `<article>` then `<body>`
//! as the extraction root, drops boilerplate containers (scripts, nav,
//! cookie/consent banners), keeps `<pre>`/`<code>` verbatim, and emits a
//! whitespace-normalized, NFC-normalized text with block boundaries at
//! headings, paragraphs, and list items. Deterministic; no I/O.

use scraper::{Html, Node, Selector};
use unicode_normalization::UnicodeNormalization;

use crate::core::ExtractedDoc;

/// Elements removed wholesale, subtree included.
const DROP_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "aside", "iframe",
];

/// Elements that force a block boundary around their content.
const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "blockquote", "div", "section", "article",
    "table", "tr", "br", "ul", "ol", "header",
];

/// Attribute substrings that mark cookie/consent boilerplate.
const NOISE_MARKERS: &[&str] = &["cookie", "consent", "gdpr"];

#[derive(Debug)]
struct Block {
    text: String,
    verbatim: bool,
}

/// Extracts the title and normalized text from an HTML document.
#[must_use]
pub fn extract_html(html: &str) -> ExtractedDoc {
    let doc = Html::parse_document(html);

    let title = selector("title")
        .and_then(|sel| doc.select(&sel).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default();

    let root = ["main", "article", "body"]
        .iter()
        .filter_map(|tag| selector(tag))
        .find_map(|sel| doc.select(&sel).next().map(|el| *el));

    let mut blocks = Vec::new();
    let mut current = String::new();
    if let Some(root) = root {
        walk(root, &mut blocks, &mut current);
    } else {
        // Fragment without a body; walk everything.
        walk(doc.tree.root(), &mut blocks, &mut current);
    }
    flush(&mut blocks, &mut current);

    ExtractedDoc {
        title,
        text: assemble(&blocks),
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn walk(node: ego_tree::NodeRef<'_, Node>, blocks: &mut Vec<Block>, current: &mut String) {
    match node.value() {
        Node::Text(text) => {
            current.push_str(&text);
        }
        Node::Element(element) => {
            let name = element.name();
            if DROP_TAGS.contains(&name) || is_noise(&element) {
                return;
            }
            if name == "pre" || name == "code" {
                flush(blocks, current);
                let mut verbatim = String::new();
                collect_verbatim(node, &mut verbatim);
                blocks.push(Block {
                    text: verbatim,
                    verbatim: true,
                });
                return;
            }
            let is_block = BLOCK_TAGS.contains(&name);
            if is_block {
                flush(blocks, current);
            }
            for child in node.children() {
                walk(child, blocks, current);
            }
            if is_block {
                flush(blocks, current);
            }
        }
        _ => {
            for child in node.children() {
                walk(child, blocks, current);
            }
        }
    }
}

fn collect_verbatim(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    if let Node::Text(text) = node.value() {
        out.push_str(&text);
    }
    for child in node.children() {
        collect_verbatim(child, out);
    }
}

fn flush(blocks: &mut Vec<Block>, current: &mut String) {
    if !current.trim().is_empty() {
        blocks.push(Block {
            text: std::mem::take(current),
            verbatim: false,
        });
    } else {
        current.clear();
    }
}

fn is_noise(element: &scraper::node::Element) -> bool {
    ["id", "class", "aria-label"].iter().any(|attr| {
        element.attr(attr).is_some_and(|value| {
            let lower = value.to_ascii_lowercase();
            NOISE_MARKERS.iter().any(|marker| lower.contains(marker))
        })
    })
}

/// Joins blocks into the final text: prose blocks get collapsed
/// whitespace and adjacent-duplicate removal, verbatim blocks keep their
/// bytes, and runs of blank lines shrink to one.
fn assemble(blocks: &[Block]) -> String {
    let mut lines: Vec<(String, bool)> = Vec::new();

    for block in blocks {
        if block.verbatim {
            if !lines.is_empty() {
                push_blank(&mut lines);
            }
            for line in block.text.trim_matches('\n').lines() {
                lines.push((line.to_string(), true));
            }
            push_blank(&mut lines);
        } else {
            let text = collapse_whitespace(&block.text);
            if text.is_empty() {
                continue;
            }
            // Drop exact duplicates of the previous prose line.
            let duplicate = lines
                .iter()
                .rev()
                .find(|(l, _)| !l.is_empty())
                .is_some_and(|(last, verbatim)| !*verbatim && *last == text);
            if duplicate {
                continue;
            }
            if !lines.is_empty() {
                push_blank(&mut lines);
            }
            lines.push((text, false));
        }
    }

    while lines.last().is_some_and(|(l, _)| l.is_empty()) {
        lines.pop();
    }

    let joined = lines
        .iter()
        .map(|(l, _)| l.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    joined.nfc().collect()
}

/// Inserts a single blank separator line, never two in a row.
fn push_blank(lines: &mut Vec<(String, bool)>) {
    if lines.last().is_some_and(|(l, _)| !l.is_empty()) {
        lines.push((String::new(), false));
    }
}

/// Collapses runs of whitespace (including newlines) to single spaces.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_main_over_body() {
        let doc = extract_html(
            "<html><head><title>T</title></head><body>\
             <div>outside</div><main><p>inside main</p></main></body></html>",
        );
        assert_eq!(doc.title, "T");
        assert!(doc.text.contains("inside main"));
        assert!(!doc.text.contains("outside"));
    }

    #[test]
    fn test_prefers_article_when_no_main() {
        let doc = extract_html(
            "<html><body><div>chrome</div><article><p>the article</p></article></body></html>",
        );
        assert!(doc.text.contains("the article"));
        assert!(!doc.text.contains("chrome"));
    }

    #[test]
    fn test_drops_boilerplate_tags() {
        let doc = extract_html(
            "<html><body><nav>navigation menu</nav><p>content</p>\
             <script>var x = 1;</script><footer>footer text</footer>\
             <aside>sidebar</aside></body></html>",
        );
        assert!(doc.text.contains("content"));
        assert!(!doc.text.contains("navigation menu"));
        assert!(!doc.text.contains("var x"));
        assert!(!doc.text.contains("footer text"));
        assert!(!doc.text.contains("sidebar"));
    }

    #[test]
    fn test_drops_cookie_consent_containers() {
        let doc = extract_html(
            "<html><body><div class=\"cookie-banner\">Accept cookies?</div>\
             <div id=\"GdprNotice\">We value privacy</div>\
             <div aria-label=\"consent dialog\">Manage consent</div>\
             <p>real text</p></body></html>",
        );
        assert!(doc.text.contains("real text"));
        assert!(!doc.text.contains("Accept cookies"));
        assert!(!doc.text.contains("value privacy"));
        assert!(!doc.text.contains("Manage consent"));
    }

    #[test]
    fn test_preserves_code_verbatim() {
        let doc = extract_html(
            "<html><body><p>Example:</p><pre>fn main() {\n    let x  =  1;\n}</pre></body></html>",
        );
        assert!(doc.text.contains("    let x  =  1;"));
    }

    #[test]
    fn test_collapses_whitespace_in_prose() {
        let doc = extract_html("<html><body><p>a   lot\n\n of    space</p></body></html>");
        assert!(doc.text.contains("a lot of space"));
    }

    #[test]
    fn test_dedupes_adjacent_identical_lines() {
        let doc = extract_html(
            "<html><body><p>repeated line</p><p>repeated line</p><p>other</p></body></html>",
        );
        assert_eq!(doc.text.matches("repeated line").count(), 1);
        assert!(doc.text.contains("other"));
    }

    #[test]
    fn test_block_boundaries_between_paragraphs() {
        let doc = extract_html("<html><body><p>one</p><p>two</p></body></html>");
        assert_eq!(doc.text, "one\n\ntwo");
    }

    #[test]
    fn test_list_items_get_boundaries() {
        let doc = extract_html("<html><body><ul><li>first</li><li>second</li></ul></body></html>");
        assert!(doc.text.contains("first"));
        assert!(doc.text.contains("second"));
        assert!(!doc.text.contains("firstsecond"));
    }

    #[test]
    fn test_output_is_nfc() {
        // "e" followed by a combining acute accent composes to é.
        let doc = extract_html("<html><body><p>cafe\u{301}</p></body></html>");
        assert!(doc.text.contains("café"));
    }

    #[test]
    fn test_empty_document() {
        let doc = extract_html("");
        assert!(doc.text.is_empty());
        assert!(doc.title.is_empty());
    }
}
