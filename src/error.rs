//! Error types for groundwork operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! pipeline stages including search, fetch, extraction, caching, LLM
//! calls, and artifact bundling.
//!
//! Two errors are sentinels with a fixed exit-code contract: the CLI maps
//! [`PipelineError::NoUsableSources`] and [`PipelineError::NoSubstantiveBody`]
//! to exit code 2; every other failure either degrades or is reported as a
//! warning in the generated report.

use thiserror::Error;

/// Result type alias for groundwork operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for groundwork operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Search backend errors.
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// Fetch policy and transport errors.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Cache storage errors.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// LLM adapter errors.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Pipeline stage errors and sentinels.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// I/O errors (file operations, bundle writes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (missing model, invalid paths).
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl Error {
    /// True when this error is one of the two sentinel conditions the CLI
    /// maps to exit code 2.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        matches!(
            self,
            Self::Pipeline(PipelineError::NoUsableSources | PipelineError::NoSubstantiveBody)
        )
    }
}

/// Pipeline driver errors, including the two exit-code sentinels.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Every selected source failed to fetch or produced no extractable text.
    #[error("no usable sources: every selected source failed to fetch or extract")]
    NoUsableSources,

    /// The synthesis stage returned an empty or unusable report body.
    #[error("no substantive body: the model returned an empty report")]
    NoSubstantiveBody,

    /// The run was cancelled; partial artifacts were flushed for resume.
    #[error("run cancelled")]
    Cancelled,

    /// A named stage failed in a non-sentinel way.
    #[error("stage {stage} failed: {message}")]
    Stage {
        /// Pipeline stage name.
        stage: &'static str,
        /// Failure description.
        message: String,
    },
}

/// Meta-search backend errors.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The search endpoint returned a non-success status.
    #[error("search backend returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Transport-level failure reaching the search endpoint.
    #[error("search request failed: {0}")]
    Transport(String),

    /// The response body was not the expected JSON shape.
    #[error("search response decode failed: {0}")]
    Decode(String),
}

impl SearchError {
    /// True for failures worth retrying on a later query.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status } => *status >= 500 || *status == 408 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Why a source URL was skipped instead of contributing an excerpt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Disallowed by the host's robots.txt.
    Robots,
    /// Opted out via an `X-Robots-Tag` directive.
    OptOut,
    /// Denied by the configured domain policy.
    Policy,
    /// The server answered with a non-success HTTP status.
    Http,
    /// Transport failure (DNS, connect, timeout) after retries.
    Network,
    /// The response fetched but yielded no extractable text.
    Extract,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Robots => "robots.txt",
            Self::OptOut => "opt-out",
            Self::Policy => "domain policy",
            Self::Http => "http status",
            Self::Network => "network",
            Self::Extract => "no extractable text",
        };
        f.write_str(s)
    }
}

/// Polite-fetcher errors.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The URL could not be parsed or lacks an http(s) scheme.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parse failure description.
        reason: String,
    },

    /// The host is excluded by the deny/allow lists.
    #[error("host denied by policy: {host}")]
    DeniedByPolicy {
        /// Denied host.
        host: String,
    },

    /// Private or loopback host refused (no `allow_private_hosts`).
    #[error("private or loopback host refused: {host}")]
    PrivateHost {
        /// Refused host.
        host: String,
    },

    /// robots.txt disallows this URL for our user agent.
    #[error("disallowed by robots.txt: {url}")]
    RobotsDisallowed {
        /// Disallowed URL.
        url: String,
    },

    /// The response carried an opt-out `X-Robots-Tag` directive.
    #[error("opt-out via X-Robots-Tag ({directive}): {url}")]
    OptOut {
        /// The directive that triggered the skip (`noai`, `notrain`, `noindex`).
        directive: String,
        /// Opted-out URL.
        url: String,
    },

    /// Non-success HTTP status after the retry budget was exhausted.
    #[error("HTTP {status} for {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Transport failure (DNS, connect, TLS, timeout).
    #[error("request failed for {url}: {reason}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Failure description.
        reason: String,
    },

    /// HTTP cache-only mode and no cached response exists.
    #[error("cache-only mode: no cached response for {url}")]
    CacheOnlyMiss {
        /// Uncached URL.
        url: String,
    },

    /// Cache layer failure during fetch.
    #[error("cache error during fetch: {0}")]
    Cache(#[from] CacheError),
}

impl FetchError {
    /// True when a retry could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Maps this error to the machine-readable skip reason recorded in the
    /// manifest. Policy-class skips are never retried.
    #[must_use]
    pub const fn skip_reason(&self) -> SkipReason {
        match self {
            Self::RobotsDisallowed { .. } => SkipReason::Robots,
            Self::OptOut { .. } => SkipReason::OptOut,
            Self::DeniedByPolicy { .. } | Self::PrivateHost { .. } | Self::InvalidUrl { .. } => {
                SkipReason::Policy
            }
            Self::Status { .. } => SkipReason::Http,
            Self::Transport { .. } | Self::CacheOnlyMiss { .. } | Self::Cache(_) => {
                SkipReason::Network
            }
        }
    }
}

/// Content-addressed cache errors.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Underlying filesystem failure.
    #[error("cache I/O failed at {path}: {reason}")]
    Io {
        /// Path involved in the failure.
        path: String,
        /// Failure description.
        reason: String,
    },

    /// A cached entry existed but its sidecar or JSON payload was unreadable.
    #[error("corrupt cache entry: {key}")]
    Corrupt {
        /// Hex digest key of the corrupt entry.
        key: String,
    },
}

/// LLM adapter errors.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The chat-completions endpoint rejected or failed the request.
    #[error("API request failed: {message}")]
    Api {
        /// Provider error message.
        message: String,
        /// Provider error type when the API reported one
        /// (e.g. `invalid_request_error`).
        error_type: Option<String>,
    },

    /// Transport failure reaching the endpoint.
    #[error("request failed: {0}")]
    Transport(String),

    /// The response contained zero choices or an empty message.
    #[error("model returned no choices")]
    NoChoices,

    /// The model's output failed strict parsing (planner/verifier JSON).
    #[error("response parse failed: {0}")]
    Parse(String),

    /// LLM cache-only mode and no cached completion exists.
    #[error("cache-only mode: no cached completion")]
    CacheOnlyMiss,

    /// Cache layer failure during an LLM call.
    #[error("cache error during llm call: {0}")]
    Cache(#[from] CacheError),
}

impl LlmError {
    /// True when a retry with backoff could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// True when the provider classified the request itself as invalid
    /// (HTTP 400 family). These trigger the prompt-shrinking fallbacks
    /// rather than a retry.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::Api { error_type: Some(t), .. } if t == "invalid_request_error"
        )
    }
}

// Implement From traits for standard library and dependency errors

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: String::new(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Pipeline(PipelineError::Stage {
            stage: "serialize",
            message: err.to_string(),
        })
    }
}
