//! Meta-search provider contract and the SearXNG-style JSON adapter.
//!
//! The consumed HTTP contract is `GET {base}/search?q=…&format=json` with
//! an optional API key header; the response carries a `results` list of
//! `{title, url, content|snippet}` objects.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::SearchResult;
use crate::error::SearchError;

/// A meta-search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Runs one query and returns up to `limit` results.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] on transport failures, non-success statuses,
    /// or undecodable responses.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError>;
}

/// SearXNG-compatible meta-search client.
#[derive(Debug, Clone)]
pub struct SearxSearch {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SearxSearch {
    /// Creates a client for the given instance URL
    /// (e.g. `http://localhost:8888`).
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::fetch::USER_AGENT)
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    #[serde(default)]
    title: String,
    url: String,
    /// SearXNG calls the snippet `content`; some deployments use `snippet`.
    #[serde(default, alias = "snippet")]
    content: Option<String>,
    #[serde(default)]
    engine: Option<String>,
}

#[async_trait]
impl SearchProvider for SearxSearch {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let url = format!("{}/search?q={encoded}&format=json", self.base_url);

        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
            });
        }

        let decoded: SearxResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        debug!(query, results = decoded.results.len(), "search results");

        Ok(decoded
            .results
            .into_iter()
            .take(limit)
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                snippet: r.content.unwrap_or_default(),
                source: r.engine.unwrap_or_else(|| "searxng".to_string()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_decoding_tolerates_missing_fields() {
        let json = r#"{"results": [
            {"title": "Alpha", "url": "https://a.example/", "content": "first"},
            {"url": "https://b.example/", "snippet": "second", "engine": "bing"}
        ]}"#;
        let decoded: SearxResponse =
            serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(decoded.results.len(), 2);
        assert_eq!(decoded.results[0].content.as_deref(), Some("first"));
        assert_eq!(decoded.results[1].content.as_deref(), Some("second"));
        assert!(decoded.results[1].title.is_empty());
        assert_eq!(decoded.results[1].engine.as_deref(), Some("bing"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider =
            SearxSearch::new("http://localhost:8888/", None).unwrap_or_else(|_| unreachable!());
        assert_eq!(provider.base_url, "http://localhost:8888");
    }
}
