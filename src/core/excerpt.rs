//! Source excerpt and extracted-document types shared across stages.

use serde::{Deserialize, Serialize};

/// A document extracted from fetched bytes: the page title and its
/// normalized text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDoc {
    /// Document title (`<title>` text for HTML; may be empty).
    pub title: String,
    /// Whitespace-normalized, NFC-normalized body text.
    pub text: String,
}

/// One numbered source excerpt as presented to the synthesizer.
///
/// Indices are 1-based and contiguous in selection order; truncation
/// shortens bodies but never drops a source or renumbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceExcerpt {
    /// 1-based contiguous index.
    pub index: usize,
    /// Source title (falls back to the search result title).
    pub title: String,
    /// Source URL.
    pub url: String,
    /// Excerpt body; may be empty after aggressive truncation.
    pub excerpt: String,
}

impl SourceExcerpt {
    /// Creates an excerpt with the given index.
    #[must_use]
    pub fn new(index: usize, title: impl Into<String>, url: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            url: url.into(),
            excerpt: excerpt.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_serde_round_trip() {
        let excerpt = SourceExcerpt::new(1, "Title", "https://example.com", "body");
        let json = serde_json::to_string(&excerpt).unwrap_or_default();
        let back: SourceExcerpt = serde_json::from_str(&json).unwrap_or(SourceExcerpt::new(0, "", "", ""));
        assert_eq!(back, excerpt);
    }
}
