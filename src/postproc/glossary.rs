//! Glossary appendix generation.
//!
//! Detects `Long Form (ACRO)` and `ACRO (Long Form)` definition patterns
//! plus repeated Title Case multi-word terms, and emits them as sorted
//! bullet lists. Skipped entirely when the document already carries a
//! Glossary heading.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::unwrap_used)]
static LONG_ACRO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([A-Z][a-zA-Z]*(?: [A-Z][a-z][a-zA-Z]*)+) \(([A-Z]{2,10})\)").unwrap());

#[allow(clippy::unwrap_used)]
static ACRO_LONG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([A-Z]{2,10}) \(([A-Z][a-zA-Z]*(?: [a-zA-Z]+)+)\)").unwrap());

#[allow(clippy::unwrap_used)]
static TITLE_TERM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([A-Z][a-z]+(?: [A-Z][a-z]+)+)\b").unwrap());

/// Minimum occurrences for a Title Case term to be glossary-worthy.
const MIN_TERM_OCCURRENCES: usize = 2;

/// Builds a Glossary section for the document, or `None` when there is
/// nothing to define or a Glossary heading already exists.
#[must_use]
pub fn build_glossary(markdown: &str) -> Option<String> {
    let has_glossary = markdown
        .lines()
        .filter_map(super::validate::heading_text)
        .any(|h| h.to_ascii_lowercase().contains("glossary"));
    if has_glossary {
        return None;
    }

    // Acronym -> long form, deduped and sorted by the BTreeMap.
    let mut acronyms: BTreeMap<String, String> = BTreeMap::new();
    for capture in LONG_ACRO_RE.captures_iter(markdown) {
        if let (Some(long), Some(acro)) = (capture.get(1), capture.get(2)) {
            acronyms
                .entry(acro.as_str().to_string())
                .or_insert_with(|| long.as_str().to_string());
        }
    }
    for capture in ACRO_LONG_RE.captures_iter(markdown) {
        if let (Some(acro), Some(long)) = (capture.get(1), capture.get(2)) {
            acronyms
                .entry(acro.as_str().to_string())
                .or_insert_with(|| long.as_str().to_string());
        }
    }

    // Repeated Title Case terms, excluding acronym long forms.
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for capture in TITLE_TERM_RE.captures_iter(markdown) {
        if let Some(term) = capture.get(1) {
            *counts.entry(term.as_str().to_string()).or_insert(0) += 1;
        }
    }
    let terms: Vec<String> = counts
        .into_iter()
        .filter(|(term, count)| {
            *count >= MIN_TERM_OCCURRENCES && !acronyms.values().any(|long| long == term)
        })
        .map(|(term, _)| term)
        .collect();

    if acronyms.is_empty() && terms.is_empty() {
        return None;
    }

    let mut section = String::from("## Glossary\n\n");
    for (acro, long) in &acronyms {
        section.push_str(&format!("- {acro} \u{2014} {long}\n"));
    }
    if !acronyms.is_empty() && !terms.is_empty() {
        section.push('\n');
    }
    for term in &terms {
        section.push_str(&format!("- {term}\n"));
    }
    Some(section)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_form_acro_pattern() {
        let doc = "# T\n\nSystems built on a Large Language Model (LLM) vary.\n";
        let glossary = build_glossary(doc).unwrap_or_default();
        assert!(glossary.contains("- LLM \u{2014} Large Language Model"));
    }

    #[test]
    fn test_acro_long_form_pattern() {
        let doc = "# T\n\nWe use TCP (Transmission Control Protocol) here.\n";
        let glossary = build_glossary(doc).unwrap_or_default();
        assert!(glossary.contains("- TCP \u{2014} Transmission Control Protocol"));
    }

    #[test]
    fn test_repeated_title_terms() {
        let doc = "# T\n\nRules for Public Suffix handling matter. A list of Public Suffix entries follows.\n";
        let glossary = build_glossary(doc).unwrap_or_default();
        assert!(glossary.contains("- Public Suffix"));
    }

    #[test]
    fn test_single_occurrence_term_excluded() {
        let doc = "# T\n\nOnly one mention of Quantum Computing appears here.\n";
        assert!(build_glossary(doc).is_none());
    }

    #[test]
    fn test_skipped_when_glossary_exists() {
        let doc = "# T\n\nSystems built on a Large Language Model (LLM).\n\n## Glossary\n\n- old\n";
        assert!(build_glossary(doc).is_none());
    }

    #[test]
    fn test_entries_sorted() {
        let doc = "# T\n\nZone Transfer (ZT) and Access Control (AC) both appear.\n";
        let glossary = build_glossary(doc).unwrap_or_default();
        let ac = glossary.find("- AC ");
        let zt = glossary.find("- ZT ");
        assert!(ac < zt);
    }

    #[test]
    fn test_no_definitions_yields_none() {
        assert!(build_glossary("# T\n\nplain lowercase text only.\n").is_none());
    }
}
