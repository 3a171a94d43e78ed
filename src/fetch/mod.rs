//! Polite fetching: domain policy, robots/opt-out enforcement, per-host
//! pacing, retries, HTTP caching, and the bounded worker pool that fans
//! out over selected URLs.

pub mod client;
pub mod policy;
pub mod robots;

pub use client::{FetchConfig, PoliteFetcher};
pub use policy::{DomainPolicy, is_private_host};
pub use robots::RobotsTxt;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::{FetchError, SkipReason};

/// User agent sent with every request and matched against robots.txt.
pub const USER_AGENT: &str = "groundwork/0.4 (+https://github.com/groundwork-rs/groundwork)";

/// Accept header for source fetches; also part of the HTTP cache key.
pub const ACCEPT_HEADER: &str =
    "text/html,application/xhtml+xml,application/pdf;q=0.9,*/*;q=0.8";

/// Bytes fetched for one URL plus response metadata.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    /// Response body.
    pub body: Vec<u8>,
    /// Content-Type header value.
    pub content_type: String,
    /// When the response was fetched (or originally cached).
    pub fetched_at: DateTime<Utc>,
    /// Whether the payload came from the HTTP cache.
    pub from_cache: bool,
}

/// A URL that was skipped, with the reason recorded for the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedSource {
    /// The skipped URL.
    pub url: String,
    /// Machine-readable skip category.
    pub reason: SkipReason,
    /// Human-readable detail.
    pub detail: String,
}

/// Something that fetches URLs. Production uses [`PoliteFetcher`]; tests
/// inject stubs.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches one URL.
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError>;
}

/// Fetches all URLs through a bounded worker pool.
///
/// One failure never aborts the others: failed URLs become
/// [`SkippedSource`] records and successful payloads are re-keyed by URL
/// so callers can reassemble selection order. `concurrency` is clamped to
/// at least one worker.
pub async fn fetch_all(
    fetcher: Arc<dyn Fetcher>,
    urls: &[String],
    concurrency: usize,
) -> (HashMap<String, FetchedPayload>, Vec<SkippedSource>) {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(urls.len());

    for url in urls {
        let fetcher = Arc::clone(&fetcher);
        let semaphore = Arc::clone(&semaphore);
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return (url, Err(FetchError::Transport {
                    url: String::new(),
                    reason: "worker pool closed".to_string(),
                }));
            };
            let result = fetcher.fetch(&url).await;
            (url, result)
        }));
    }

    let mut fetched = HashMap::new();
    let mut skipped = Vec::new();
    for joined in join_all(handles).await {
        match joined {
            Ok((url, Ok(payload))) => {
                fetched.insert(url, payload);
            }
            Ok((url, Err(error))) => {
                warn!(url = %url, error = %error, "source skipped");
                skipped.push(SkippedSource {
                    url,
                    reason: error.skip_reason(),
                    detail: error.to_string(),
                });
            }
            Err(join_error) => {
                warn!(error = %join_error, "fetch task join failed");
            }
        }
    }

    (fetched, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubFetcher;

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
            if url.contains("fail") {
                return Err(FetchError::Status {
                    status: 500,
                    url: url.to_string(),
                });
            }
            Ok(FetchedPayload {
                body: format!("body of {url}").into_bytes(),
                content_type: "text/html".to_string(),
                fetched_at: Utc::now(),
                from_cache: false,
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_all_isolates_failures() {
        let urls = vec![
            "https://a.example/ok".to_string(),
            "https://b.example/fail".to_string(),
            "https://c.example/ok".to_string(),
        ];
        let (fetched, skipped) = fetch_all(Arc::new(StubFetcher), &urls, 2).await;

        assert_eq!(fetched.len(), 2);
        assert!(fetched.contains_key("https://a.example/ok"));
        assert!(fetched.contains_key("https://c.example/ok"));
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].url, "https://b.example/fail");
        assert_eq!(skipped[0].reason, SkipReason::Http);
    }

    #[tokio::test]
    async fn test_fetch_all_zero_concurrency_clamps() {
        let urls = vec!["https://a.example/ok".to_string()];
        let (fetched, skipped) = fetch_all(Arc::new(StubFetcher), &urls, 0).await;
        assert_eq!(fetched.len(), 1);
        assert!(skipped.is_empty());
    }
}
