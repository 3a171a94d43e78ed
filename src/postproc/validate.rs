//! Report structure validation.
//!
//! Warn-only: a missing required heading never fails the run, it appends
//! a warning footnote so auditors can see what the model skipped.

/// Returns the required headings that do not appear in the document at
/// any heading level. Appendix labels ("Appendix A. Glossary") still
/// count as the underlying heading.
#[must_use]
pub fn missing_sections(markdown: &str, required: &[String]) -> Vec<String> {
    let headings: Vec<String> = markdown
        .lines()
        .filter_map(heading_text)
        .map(|h| h.to_ascii_lowercase())
        .collect();

    required
        .iter()
        .filter(|want| {
            let want_lower = want.to_ascii_lowercase();
            !headings.iter().any(|h| h.contains(&want_lower))
        })
        .cloned()
        .collect()
}

/// Extracts the text of an ATX heading line, or `None`.
#[must_use]
pub fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if rest.starts_with(' ') || rest.is_empty() {
        Some(rest.trim())
    } else {
        None
    }
}

/// Formats validation warnings as blockquote footnotes.
#[must_use]
pub fn warning_lines(missing: &[String]) -> String {
    missing
        .iter()
        .map(|section| format!("> WARNING: required section \"{section}\" is missing.\n"))
        .collect()
}
