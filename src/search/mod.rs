//! Search aggregation: the meta-search provider contract, the SearXNG
//! adapter, and the merge/dedupe/cap selection logic.

pub mod provider;
pub mod select;

pub use provider::{SearchProvider, SearxSearch};
pub use select::{SelectionPolicy, canonical_url, merge_results, registrable_domain, select};

use serde::{Deserialize, Serialize};

/// One result from the meta-search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Result URL (canonicalized after merge).
    pub url: String,
    /// Snippet or content summary.
    pub snippet: String,
    /// Originating engine or backend name.
    pub source: String,
}
