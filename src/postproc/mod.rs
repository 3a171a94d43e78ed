//! Report post-processing.
//!
//! Pure transforms over the synthesized Markdown, applied in a fixed
//! order: structure validation (warn-only), reference enrichment, the
//! evidence-check appendix, the glossary appendix, the embedded manifest
//! with its skipped-source listing, the table of contents, appendix
//! labeling, validation warnings, and the reproducibility footer.

pub mod appendix;
pub mod enrich;
pub mod glossary;
pub mod toc;
pub mod validate;

pub use appendix::label_appendices;
pub use enrich::enrich_references;
pub use glossary::build_glossary;
pub use toc::{DEFAULT_TOC_THRESHOLD, insert_toc};
pub use validate::{missing_sections, warning_lines};

use chrono::NaiveDate;

use crate::bundle::Manifest;
use crate::verify::VerificationResult;

/// Inputs for the post-processing pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessInputs<'a> {
    /// Planned outline, used for structure validation.
    pub outline: &'a [String],
    /// Verifier output; `None` skips the evidence appendix silently.
    pub verification: Option<&'a VerificationResult>,
    /// Run manifest for the embedded manifest section and footer.
    pub manifest: &'a Manifest,
    /// Section count that triggers ToC insertion.
    pub toc_threshold: usize,
    /// Date for access-date enrichment (UTC).
    pub today: NaiveDate,
}

/// Applies the full post-processing pipeline.
#[must_use]
pub fn apply(markdown: &str, inputs: &PostProcessInputs<'_>) -> String {
    let missing = missing_sections(markdown, inputs.outline);

    let mut doc = enrich_references(markdown, inputs.today);

    if let Some(verification) = inputs.verification {
        doc = replace_section(&doc, "Evidence check");
        ensure_trailing_gap(&mut doc);
        doc.push_str(&evidence_section(verification));
    }

    if let Some(glossary) = build_glossary(&doc) {
        ensure_trailing_gap(&mut doc);
        doc.push_str(&glossary);
    }

    doc = replace_section(&doc, "Manifest");
    ensure_trailing_gap(&mut doc);
    doc.push_str(&manifest_section(inputs.manifest));

    doc = insert_toc(&doc, inputs.toc_threshold);
    doc = label_appendices(&doc);

    if !missing.is_empty() {
        ensure_trailing_gap(&mut doc);
        doc.push_str(&warning_lines(&missing));
    }

    ensure_trailing_gap(&mut doc);
    doc.push_str(&reproducibility_footer(inputs.manifest));
    doc.push('\n');
    doc
}

/// Renders the evidence-check appendix from a verification result.
#[must_use]
pub fn evidence_section(verification: &VerificationResult) -> String {
    let mut section = String::from("## Evidence check\n\n");
    section.push_str(&verification.summary);
    section.push('\n');
    if !verification.claims.is_empty() {
        section.push('\n');
    }
    for (number, claim) in verification.claims.iter().enumerate() {
        let citations = if claim.citations.is_empty() {
            "none".to_string()
        } else {
            claim
                .citations
                .iter()
                .map(|n| format!("[{n}]"))
                .collect::<String>()
        };
        let confidence = match claim.confidence {
            crate::verify::Confidence::High => "high",
            crate::verify::Confidence::Medium => "medium",
            crate::verify::Confidence::Low => "low",
        };
        section.push_str(&format!(
            "{}. {} \u{2014} citations: {citations}; confidence: {confidence}\n",
            number + 1,
            claim.text
        ));
    }
    section
}

/// Renders the embedded manifest section and skipped-source listing.
#[must_use]
pub fn manifest_section(manifest: &Manifest) -> String {
    let mut section = String::from("## Manifest\n\n");
    for entry in &manifest.entries {
        section.push_str(&format!(
            "{}. {} \u{2014} sha256={}; chars={}\n",
            entry.index, entry.url, entry.sha256, entry.chars
        ));
    }
    if manifest.entries.is_empty() {
        section.push_str("No sources were used.\n");
    }
    if !manifest.skipped.is_empty() {
        section.push_str("\n### Skipped sources\n\n");
        for skipped in &manifest.skipped {
            section.push_str(&format!(
                "- {} \u{2014} {} ({})\n",
                skipped.url, skipped.reason, skipped.detail
            ));
        }
    }
    section
}

/// Renders the reproducibility footer line.
#[must_use]
pub fn reproducibility_footer(manifest: &Manifest) -> String {
    format!(
        "Reproducibility: model={}; llm_base_url={}; sources_used={}; http_cache={}; llm_cache={}",
        manifest.meta.model,
        manifest.meta.llm_base_url,
        manifest.meta.source_count,
        manifest.meta.http_cache,
        manifest.meta.llm_cache
    )
}

/// Removes a section (its heading through the line before the next
/// heading of the same or higher level), matching the bare heading name
/// with or without an appendix label.
fn replace_section(markdown: &str, name: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut skipping_level: Option<usize> = None;

    for line in markdown.lines() {
        let trimmed = line.trim_start();
        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        let is_heading = (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ');

        if let Some(level) = skipping_level {
            if is_heading && hashes <= level {
                skipping_level = None;
            } else {
                continue;
            }
        }

        if is_heading {
            let text = trimmed[hashes..].trim();
            let bare = text
                .strip_prefix("Appendix ")
                .and_then(|rest| rest.split_once('.'))
                .map_or(text, |(_, tail)| tail.trim());
            if bare.eq_ignore_ascii_case(name) {
                skipping_level = Some(hashes);
                continue;
            }
        }
        out.push(line);
    }

    let mut joined = out.join("\n");
    while joined.ends_with("\n\n") {
        joined.pop();
    }
    if markdown.ends_with('\n') && !joined.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

/// Ensures the document ends with exactly one blank line before a new
/// section is appended.
fn ensure_trailing_gap(doc: &mut String) {
    while doc.ends_with('\n') {
        doc.pop();
    }
    if !doc.is_empty() {
        doc.push_str("\n\n");
    }
}
