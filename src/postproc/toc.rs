//! Automatic table of contents.
//!
//! Inserted after the title/date header block when the document has
//! enough section headings to warrant navigation. Appendix, reference,
//! and glossary headings stay out of the ToC. Idempotent: a document
//! that already has a ToC is returned unchanged.

/// Default section count that triggers ToC insertion.
pub const DEFAULT_TOC_THRESHOLD: usize = 12;

/// ToC heading inserted into the document.
const TOC_HEADING: &str = "## Table of contents";

/// Headings excluded from the ToC (and from the trigger count).
const EXCLUDED: &[&str] = &["references", "glossary", "evidence check", "manifest", "table of contents"];

/// Inserts a ToC when the document has at least `min_sections` eligible
/// H2-H4 headings. Idempotent.
#[must_use]
pub fn insert_toc(markdown: &str, min_sections: usize) -> String {
    if markdown.contains(TOC_HEADING) {
        return markdown.to_string();
    }

    let entries: Vec<(usize, String)> = markdown
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let hashes = trimmed.chars().take_while(|&c| c == '#').count();
            if !(2..=4).contains(&hashes) {
                return None;
            }
            let text = trimmed[hashes..].trim();
            if text.is_empty() {
                return None;
            }
            let lower = text.to_ascii_lowercase();
            if lower.starts_with("appendix") || EXCLUDED.iter().any(|e| lower.contains(e)) {
                return None;
            }
            Some((hashes, text.to_string()))
        })
        .collect();

    if entries.len() < min_sections {
        return markdown.to_string();
    }

    let mut toc = format!("{TOC_HEADING}\n\n");
    for (level, text) in &entries {
        let indent = "  ".repeat(level - 2);
        toc.push_str(&format!("{indent}- [{text}](#{})\n", anchor(text)));
    }

    insert_after_header(markdown, &toc)
}

/// GitHub-style anchor slug: lowercase, alphanumerics and hyphens only,
/// spaces become hyphens.
fn anchor(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == ' ' || c == '-' {
                Some('-')
            } else {
                None
            }
        })
        .collect()
}

/// Inserts `section` after the H1 title and its date line (the first two
/// non-empty lines), or at the top when no header block exists.
fn insert_after_header(markdown: &str, section: &str) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut insert_at = None;
    let mut first_is_heading = false;

    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if insert_at.is_none() && !first_is_heading {
            first_is_heading = line.trim_start().starts_with('#');
            if !first_is_heading {
                // No H1 header block; insert at the very top.
                insert_at = Some(0);
                break;
            }
        } else {
            // Past the title and its date line.
            insert_at = Some(index + 1);
            break;
        }
    }
    let insert_at = insert_at.unwrap_or(if first_is_heading { lines.len() } else { 0 });

    let mut out = String::new();
    for (index, line) in lines.iter().enumerate() {
        if index == insert_at {
            out.push('\n');
            out.push_str(section);
        }
        out.push_str(line);
        out.push('\n');
    }
    if insert_at >= lines.len() {
        out.push('\n');
        out.push_str(section);
    }
    if !markdown.ends_with('\n') && out.ends_with('\n') {
        out.pop();
    }
    out
}
