//! Run configuration with builder pattern and environment variable
//! support.
//!
//! Configuration is resolved in order: explicit values, then environment
//! variables, then defaults. The CLI collaborator fills the builder from
//! flags; library users construct it directly.

use std::path::PathBuf;

use crate::error::Error;
use crate::fetch::FetchConfig;
use crate::postproc::DEFAULT_TOC_THRESHOLD;

/// Default maximum selected sources.
const DEFAULT_MAX_SOURCES: usize = 12;
/// Default per-registrable-domain cap.
const DEFAULT_PER_DOMAIN_CAP: usize = 3;
/// Default minimum non-whitespace snippet length.
const DEFAULT_MIN_SNIPPET_CHARS: usize = 40;
/// Default excerpt byte allowance per source.
const DEFAULT_PER_SOURCE_CHARS: usize = 8_000;
/// Default results requested per planned query.
const DEFAULT_RESULTS_PER_QUERY: usize = 8;
/// Default tokens reserved for the model's output.
const DEFAULT_RESERVED_OUTPUT_TOKENS: u32 = 2_048;

/// Configuration for one research run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model identifier; required unless `dry_run`.
    pub model: String,
    /// API key for the LLM endpoint; local servers accept any value.
    pub api_key: String,
    /// LLM endpoint base URL override.
    pub llm_base_url: Option<String>,
    /// Meta-search endpoint base URL; absent means no search backend.
    pub search_base_url: Option<String>,
    /// Optional meta-search API key.
    pub search_api_key: Option<String>,
    /// Cache root directory (`http/` and `llm/` buckets live under it).
    pub cache_dir: PathBuf,
    /// Directory for artifact bundles.
    pub reports_dir: PathBuf,
    /// Maximum selected sources.
    pub max_sources: usize,
    /// Maximum sources per registrable domain.
    pub per_domain_cap: usize,
    /// Minimum non-whitespace snippet length for selection.
    pub min_snippet_chars: usize,
    /// Excerpt byte allowance per source before budget fitting.
    pub per_source_chars: usize,
    /// Results requested from the search backend per query.
    pub results_per_query: usize,
    /// Preferred result/report language.
    pub preferred_language: Option<String>,
    /// Tokens reserved for the model's output.
    pub reserved_output_tokens: u32,
    /// Serve LLM calls only from cache; misses fail fast.
    pub llm_cache_only: bool,
    /// Plan and select only; replace synthesis with a deterministic
    /// report.
    pub dry_run: bool,
    /// Enable the naive PDF text path.
    pub enable_pdf: bool,
    /// Pack the bundle into a tarball.
    pub make_tarball: bool,
    /// Create cache files with 0700/0600 permissions.
    pub strict_cache_perms: bool,
    /// Section count that triggers ToC insertion.
    pub toc_threshold: usize,
    /// Fetcher behavior (concurrency, retries, robots overrides, ...).
    pub fetch: FetchConfig,
}

impl PipelineConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    model: Option<String>,
    api_key: Option<String>,
    llm_base_url: Option<String>,
    search_base_url: Option<String>,
    search_api_key: Option<String>,
    cache_dir: Option<PathBuf>,
    reports_dir: Option<PathBuf>,
    max_sources: Option<usize>,
    per_domain_cap: Option<usize>,
    min_snippet_chars: Option<usize>,
    per_source_chars: Option<usize>,
    results_per_query: Option<usize>,
    preferred_language: Option<String>,
    reserved_output_tokens: Option<u32>,
    llm_cache_only: bool,
    dry_run: bool,
    enable_pdf: bool,
    make_tarball: bool,
    strict_cache_perms: bool,
    toc_threshold: Option<usize>,
    fetch: Option<FetchConfig>,
}

impl PipelineConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.model.is_none() {
            self.model = std::env::var("GROUNDWORK_MODEL").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("GROUNDWORK_API_KEY"))
                .ok();
        }
        if self.llm_base_url.is_none() {
            self.llm_base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("GROUNDWORK_LLM_BASE_URL"))
                .ok();
        }
        if self.search_base_url.is_none() {
            self.search_base_url = std::env::var("GROUNDWORK_SEARCH_URL").ok();
        }
        if self.search_api_key.is_none() {
            self.search_api_key = std::env::var("GROUNDWORK_SEARCH_KEY").ok();
        }
        if self.cache_dir.is_none() {
            self.cache_dir = std::env::var("GROUNDWORK_CACHE_DIR").ok().map(PathBuf::from);
        }
        if self.reports_dir.is_none() {
            self.reports_dir = std::env::var("GROUNDWORK_REPORTS_DIR")
                .ok()
                .map(PathBuf::from);
        }
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the LLM base URL.
    #[must_use]
    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.llm_base_url = Some(url.into());
        self
    }

    /// Sets the meta-search base URL.
    #[must_use]
    pub fn search_base_url(mut self, url: impl Into<String>) -> Self {
        self.search_base_url = Some(url.into());
        self
    }

    /// Sets the meta-search API key.
    #[must_use]
    pub fn search_api_key(mut self, key: impl Into<String>) -> Self {
        self.search_api_key = Some(key.into());
        self
    }

    /// Sets the cache root directory.
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sets the reports directory.
    #[must_use]
    pub fn reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = Some(dir.into());
        self
    }

    /// Sets the maximum selected sources.
    #[must_use]
    pub const fn max_sources(mut self, n: usize) -> Self {
        self.max_sources = Some(n);
        self
    }

    /// Sets the per-domain cap.
    #[must_use]
    pub const fn per_domain_cap(mut self, n: usize) -> Self {
        self.per_domain_cap = Some(n);
        self
    }

    /// Sets the minimum snippet length.
    #[must_use]
    pub const fn min_snippet_chars(mut self, n: usize) -> Self {
        self.min_snippet_chars = Some(n);
        self
    }

    /// Sets the per-source excerpt allowance.
    #[must_use]
    pub const fn per_source_chars(mut self, n: usize) -> Self {
        self.per_source_chars = Some(n);
        self
    }

    /// Sets the results requested per query.
    #[must_use]
    pub const fn results_per_query(mut self, n: usize) -> Self {
        self.results_per_query = Some(n);
        self
    }

    /// Sets the preferred language.
    #[must_use]
    pub fn preferred_language(mut self, lang: impl Into<String>) -> Self {
        self.preferred_language = Some(lang.into());
        self
    }

    /// Sets the reserved output tokens.
    #[must_use]
    pub const fn reserved_output_tokens(mut self, n: u32) -> Self {
        self.reserved_output_tokens = Some(n);
        self
    }

    /// Serves LLM calls only from cache.
    #[must_use]
    pub const fn llm_cache_only(mut self, yes: bool) -> Self {
        self.llm_cache_only = yes;
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub const fn dry_run(mut self, yes: bool) -> Self {
        self.dry_run = yes;
        self
    }

    /// Enables the naive PDF text path.
    #[must_use]
    pub const fn enable_pdf(mut self, yes: bool) -> Self {
        self.enable_pdf = yes;
        self
    }

    /// Enables tarball packing.
    #[must_use]
    pub const fn make_tarball(mut self, yes: bool) -> Self {
        self.make_tarball = yes;
        self
    }

    /// Enables strict cache permissions.
    #[must_use]
    pub const fn strict_cache_perms(mut self, yes: bool) -> Self {
        self.strict_cache_perms = yes;
        self
    }

    /// Sets the ToC trigger threshold.
    #[must_use]
    pub const fn toc_threshold(mut self, n: usize) -> Self {
        self.toc_threshold = Some(n);
        self
    }

    /// Sets the fetcher configuration.
    #[must_use]
    pub fn fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = Some(fetch);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no model is set for a non-dry run.
    pub fn build(self) -> Result<PipelineConfig, Error> {
        let model = self.model.unwrap_or_default();
        if model.is_empty() && !self.dry_run {
            return Err(Error::Config {
                message: "model is required (set --model or GROUNDWORK_MODEL)".to_string(),
            });
        }

        let cache_dir = self.cache_dir.unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("groundwork")
        });

        Ok(PipelineConfig {
            model,
            api_key: self.api_key.unwrap_or_else(|| "sk-local".to_string()),
            llm_base_url: self.llm_base_url,
            search_base_url: self.search_base_url,
            search_api_key: self.search_api_key,
            cache_dir,
            reports_dir: self.reports_dir.unwrap_or_else(|| PathBuf::from("reports")),
            max_sources: self.max_sources.unwrap_or(DEFAULT_MAX_SOURCES),
            per_domain_cap: self.per_domain_cap.unwrap_or(DEFAULT_PER_DOMAIN_CAP),
            min_snippet_chars: self.min_snippet_chars.unwrap_or(DEFAULT_MIN_SNIPPET_CHARS),
            per_source_chars: self.per_source_chars.unwrap_or(DEFAULT_PER_SOURCE_CHARS),
            results_per_query: self.results_per_query.unwrap_or(DEFAULT_RESULTS_PER_QUERY),
            preferred_language: self.preferred_language,
            reserved_output_tokens: self
                .reserved_output_tokens
                .unwrap_or(DEFAULT_RESERVED_OUTPUT_TOKENS),
            llm_cache_only: self.llm_cache_only,
            dry_run: self.dry_run,
            enable_pdf: self.enable_pdf,
            make_tarball: self.make_tarball,
            strict_cache_perms: self.strict_cache_perms,
            toc_threshold: self.toc_threshold.unwrap_or(DEFAULT_TOC_THRESHOLD),
            fetch: self.fetch.unwrap_or_default(),
        })
    }
}
