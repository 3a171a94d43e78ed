//! Run manifest: the machine- and human-readable record of sources,
//! digests, and run metadata that makes a report auditable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::SourceExcerpt;
use crate::fetch::SkippedSource;

/// One source entry: its index, location, and excerpt digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// 1-based source index, matching the report's citations.
    pub index: usize,
    /// Source URL.
    pub url: String,
    /// Source title.
    pub title: String,
    /// Hex SHA-256 of the excerpt text as used for synthesis.
    pub sha256: String,
    /// Excerpt length in bytes.
    pub chars: usize,
}

impl ManifestEntry {
    /// Builds an entry from an excerpt, digesting its body.
    #[must_use]
    pub fn from_excerpt(excerpt: &SourceExcerpt) -> Self {
        Self {
            index: excerpt.index,
            url: excerpt.url.clone(),
            title: excerpt.title.clone(),
            sha256: hex::encode(Sha256::digest(excerpt.excerpt.as_bytes())),
            chars: excerpt.excerpt.len(),
        }
    }
}

/// Run metadata recorded alongside the entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMeta {
    /// Model used for synthesis.
    pub model: String,
    /// LLM endpoint base URL (or "default").
    pub llm_base_url: String,
    /// Number of sources used.
    pub source_count: usize,
    /// Whether the HTTP cache was enabled.
    pub http_cache: bool,
    /// Whether the LLM cache was enabled.
    pub llm_cache: bool,
    /// Generation time, UTC, RFC 3339.
    pub generated_at_utc: String,
}

/// The full manifest persisted as `manifest.json` and embedded in the
/// report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Run metadata.
    pub meta: ManifestMeta,
    /// Source entries in index order.
    pub entries: Vec<ManifestEntry>,
    /// URLs skipped during fetching, with reasons.
    #[serde(default)]
    pub skipped: Vec<SkippedSource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_digest_matches_recomputation() {
        let excerpt = SourceExcerpt::new(1, "T", "https://a.example", "excerpt body");
        let entry = ManifestEntry::from_excerpt(&excerpt);
        assert_eq!(entry.chars, "excerpt body".len());
        assert_eq!(
            entry.sha256,
            hex::encode(Sha256::digest(b"excerpt body"))
        );
    }

    #[test]
    fn test_manifest_serde_round_trip() {
        let manifest = Manifest {
            meta: ManifestMeta {
                model: "test-model".to_string(),
                llm_base_url: "http://localhost:8080/v1".to_string(),
                source_count: 1,
                http_cache: true,
                llm_cache: false,
                generated_at_utc: "2026-01-01T00:00:00Z".to_string(),
            },
            entries: vec![ManifestEntry::from_excerpt(&SourceExcerpt::new(
                1, "T", "https://a.example", "body",
            ))],
            skipped: Vec::new(),
        };
        let json = serde_json::to_string(&manifest).unwrap_or_default();
        let back: Manifest = serde_json::from_str(&json).unwrap_or_else(|_| unreachable!());
        assert_eq!(back.entries, manifest.entries);
        assert_eq!(back.meta, manifest.meta);
    }
}
