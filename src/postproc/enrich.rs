//! Reference enrichment. No network: every rewrite is a pure string
//! transform on the References section.
//!
//! - arXiv PDF links become abstract links.
//! - IETF datatracker RFC links become rfc-editor links.
//! - A detected DOI gains a `DOI: https://doi.org/...` suffix.
//! - Reference lines with a URL but no access date gain
//!   `(Accessed on YYYY-MM-DD)` in UTC.
//!
//! All transforms are idempotent on already-enriched input.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

#[allow(clippy::unwrap_used)]
static ARXIV_PDF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"arxiv\.org/pdf/([A-Za-z0-9.\-]+?)(?:v\d+)?\.pdf").unwrap());

#[allow(clippy::unwrap_used)]
static DATATRACKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"datatracker\.ietf\.org/doc/html/(rfc\d+)").unwrap());

#[allow(clippy::unwrap_used)]
static DOI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(10\.\d{4,9}/[^\s\)\]>,;]+)").unwrap());

#[allow(clippy::unwrap_used)]
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

/// Enriches the References section of a report. Lines outside it are
/// untouched.
#[must_use]
pub fn enrich_references(markdown: &str, today: NaiveDate) -> String {
    let mut out = Vec::new();
    let mut in_references = false;

    for line in markdown.lines() {
        if let Some(heading) = super::validate::heading_text(line) {
            in_references = heading.to_ascii_lowercase().contains("references");
            out.push(line.to_string());
            continue;
        }
        if in_references {
            out.push(enrich_line(line, today));
        } else {
            out.push(line.to_string());
        }
    }

    let mut joined = out.join("\n");
    if markdown.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

/// Enriches one reference line.
#[must_use]
pub fn enrich_line(line: &str, today: NaiveDate) -> String {
    let mut line = ARXIV_PDF_RE
        .replace_all(line, "arxiv.org/abs/$1")
        .into_owned();
    line = DATATRACKER_RE
        .replace_all(&line, "rfc-editor.org/rfc/$1")
        .into_owned();

    if !line.contains("doi.org")
        && let Some(doi) = DOI_RE.captures(&line).and_then(|c| c.get(1))
    {
        let doi = doi.as_str().trim_end_matches(['.', ',']);
        line.push_str(&format!(" DOI: https://doi.org/{doi}"));
    }

    if URL_RE.is_match(&line) && !line.contains("(Accessed on ") {
        line.push_str(&format!(" (Accessed on {})", today.format("%Y-%m-%d")));
    }

    line
}
