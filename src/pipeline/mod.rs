//! Pipeline driver.
//!
//! Composes the whole run: brief parsing, planning, search aggregation,
//! selection, polite fetching, extraction, budget fitting, synthesis,
//! verification, post-processing, and artifact bundling. Partial
//! artifacts are persisted eagerly at stage boundaries, so cancellation
//! or a late failure always leaves an inspectable, resumable bundle.

pub mod config;

pub use config::{PipelineConfig, PipelineConfigBuilder};

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::{self, BudgetEstimate};
use crate::bundle::{Bundle, Manifest, ManifestEntry, ManifestMeta};
use crate::cache::Cache;
use crate::core::{Brief, ReportType, SourceExcerpt, Template, template_for};
use crate::error::{Error, PipelineError, SkipReason};
use crate::extract::extract_payload;
use crate::fetch::{Fetcher, PoliteFetcher, SkippedSource, fetch_all};
use crate::llm::{ChatProvider, OpenAiChat};
use crate::planner::{self, Plan};
use crate::postproc::{self, PostProcessInputs};
use crate::search::{
    SearchProvider, SearchResult, SearxSearch, SelectionPolicy, merge_results, select,
};
use crate::synth::{self, SynthesisRequest};
use crate::verify;

/// Counters for one run, logged at completion.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStats {
    /// Queries the planner produced.
    pub queries_planned: usize,
    /// Results after merge and dedupe.
    pub results_merged: usize,
    /// Sources selected for fetching.
    pub sources_selected: usize,
    /// Sources fetched successfully.
    pub sources_fetched: usize,
    /// Sources skipped (policy, robots, errors, empty extraction).
    pub sources_skipped: usize,
    /// Fetches served from the HTTP cache.
    pub cache_hits: usize,
    /// Excerpts handed to the synthesizer.
    pub excerpts: usize,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutput {
    /// Final report Markdown.
    pub markdown: String,
    /// Bundle directory with all per-run artifacts.
    pub bundle_dir: std::path::PathBuf,
    /// Path of `report.md` inside the bundle.
    pub report_path: std::path::PathBuf,
    /// The run manifest.
    pub manifest: Manifest,
    /// Run counters.
    pub stats: RunStats,
}

/// The end-to-end research pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    search: Option<Arc<dyn SearchProvider>>,
    llm: Option<Arc<dyn ChatProvider>>,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl Pipeline {
    /// Builds a pipeline with production components from configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, Error> {
        let search: Option<Arc<dyn SearchProvider>> = match &config.search_base_url {
            Some(base) => Some(Arc::new(SearxSearch::new(
                base,
                config.search_api_key.as_deref(),
            )?)),
            None => None,
        };

        let llm: Option<Arc<dyn ChatProvider>> = if config.model.is_empty() {
            None
        } else {
            Some(Arc::new(OpenAiChat::new(
                &config.api_key,
                config.llm_base_url.as_deref(),
            )))
        };

        Ok(Self {
            config,
            search,
            llm,
            fetcher: None,
        })
    }

    /// Builds a pipeline with injected components (used by tests and
    /// embedders).
    #[must_use]
    pub fn with_components(
        config: PipelineConfig,
        search: Option<Arc<dyn SearchProvider>>,
        llm: Option<Arc<dyn ChatProvider>>,
        fetcher: Option<Arc<dyn Fetcher>>,
    ) -> Self {
        Self {
            config,
            search,
            llm,
            fetcher,
        }
    }

    /// Executes the full run for a brief.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NoUsableSources`] when nothing could be fetched
    /// and extracted, [`PipelineError::NoSubstantiveBody`] when synthesis
    /// produced nothing usable, [`PipelineError::Cancelled`] on
    /// cancellation (after flushing partial artifacts). Other stage
    /// failures are logged and degrade where the design allows.
    #[allow(clippy::too_many_lines)]
    pub async fn run(&self, brief_text: &str, cancel: CancellationToken) -> Result<RunOutput, Error> {
        let config = &self.config;
        let mut stats = RunStats::default();

        let cache = self.open_cache();
        let brief = Brief::parse(brief_text);
        let template = template_for(ReportType::normalize(brief.report_type.as_deref()));
        info!(topic = %brief.topic_or_default(), template = template.name, "run started");

        let bundle = Bundle::create(&config.reports_dir, brief.topic_or_default())?;

        if let Some(llm) = &self.llm
            && let Err(e) = llm.preflight().await
        {
            warn!(error = %e, "LLM preflight failed; continuing");
        }

        // Plan.
        let plan = with_cancel(
            &cancel,
            planner::plan(
                self.llm.as_deref(),
                cache.as_deref(),
                config.llm_cache_only,
                &config.model,
                &brief,
                template,
                config.preferred_language.as_deref(),
            ),
        )
        .await?;
        stats.queries_planned = plan.queries.len();
        persist_json(&bundle, "planner.json", &plan);

        // Search, serially per query to stay polite to the backend.
        let mut groups: Vec<Vec<SearchResult>> = Vec::new();
        if let Some(search) = &self.search {
            for query in &plan.queries {
                match with_cancel(&cancel, search.search(query, config.results_per_query)).await? {
                    Ok(results) => groups.push(results),
                    Err(e) => warn!(query = %query, error = %e, "search query failed"),
                }
            }
        } else {
            debug!("no search backend configured");
        }

        // Select.
        let merged = merge_results(groups);
        stats.results_merged = merged.len();
        let policy = SelectionPolicy {
            max_total: config.max_sources,
            per_domain: config.per_domain_cap,
            min_snippet_chars: config.min_snippet_chars,
            preferred_language: config.preferred_language.clone(),
        };
        let selected = select(merged, &policy);
        stats.sources_selected = selected.len();
        let mut selected_sorted = selected.clone();
        selected_sorted.sort_by(|a, b| a.url.cmp(&b.url));
        persist_json(&bundle, "selected.json", &selected_sorted);

        if config.dry_run {
            return self.finish_dry_run(&bundle, &brief, template, &plan, &selected, cache.is_some(), stats);
        }

        // Fetch.
        let fetcher: Arc<dyn Fetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(PoliteFetcher::new(
                config.fetch.clone(),
                cache.clone(),
                cancel.clone(),
            )?),
        };
        let urls: Vec<String> = selected.iter().map(|r| r.url.clone()).collect();
        let (payloads, mut skipped) =
            with_cancel(&cancel, fetch_all(fetcher, &urls, config.fetch.concurrency)).await?;
        stats.sources_fetched = payloads.len();
        stats.cache_hits = payloads.values().filter(|p| p.from_cache).count();

        // Extract, preserving selection order and contiguous indices.
        let mut excerpts: Vec<SourceExcerpt> = Vec::new();
        for result in &selected {
            let Some(payload) = payloads.get(&result.url) else {
                continue;
            };
            let doc = extract_payload(&payload.body, &payload.content_type, config.enable_pdf);
            match doc {
                Some(doc) if !doc.text.trim().is_empty() => {
                    let title = if doc.title.is_empty() {
                        result.title.clone()
                    } else {
                        doc.title
                    };
                    let text =
                        budget::truncate_at_boundary(&doc.text, config.per_source_chars).to_string();
                    excerpts.push(SourceExcerpt::new(
                        excerpts.len() + 1,
                        title,
                        result.url.clone(),
                        text,
                    ));
                }
                Some(_) => {
                    skipped.push(SkippedSource {
                        url: result.url.clone(),
                        reason: SkipReason::Extract,
                        detail: "no extractable text".to_string(),
                    });
                }
                None => {
                    skipped.push(SkippedSource {
                        url: result.url.clone(),
                        reason: SkipReason::Extract,
                        detail: "pdf extraction disabled".to_string(),
                    });
                }
            }
        }
        stats.sources_skipped = skipped.len();

        if excerpts.is_empty() {
            persist_json(&bundle, "extracts.json", &excerpts);
            warn!("no usable sources after fetch and extraction");
            return Err(PipelineError::NoUsableSources.into());
        }

        // Budget: fit excerpt bodies into the model context.
        let user_skeleton = {
            let skeleton_request = SynthesisRequest {
                model: &config.model,
                brief: &brief,
                template,
                outline: &plan.outline,
                excerpts: &excerpts,
                language: config.preferred_language.as_deref(),
                reserved_output_tokens: config.reserved_output_tokens,
            };
            synth::build_user_prompt(&skeleton_request, true)
        };
        let (excerpts, estimate) = budget::fit_excerpts(
            excerpts,
            &config.model,
            template.system_prompt,
            &user_skeleton,
            config.reserved_output_tokens as usize,
        );
        stats.excerpts = excerpts.len();
        debug!(
            prompt_tokens = estimate.prompt_tokens,
            remaining = estimate.remaining,
            fits = estimate.fits,
            "budget fitted"
        );
        persist_json(&bundle, "extracts.json", &excerpts);

        // Synthesize.
        let llm = self.llm.as_deref().ok_or_else(|| Error::Config {
            message: "model is required for synthesis".to_string(),
        })?;
        let request = SynthesisRequest {
            model: &config.model,
            brief: &brief,
            template,
            outline: &plan.outline,
            excerpts: &excerpts,
            language: config.preferred_language.as_deref(),
            reserved_output_tokens: config.reserved_output_tokens,
        };
        let markdown = with_cancel(
            &cancel,
            synth::synthesize(llm, cache.as_deref(), config.llm_cache_only, &request),
        )
        .await??;

        // Verify; failures already degrade inside.
        let verification = with_cancel(
            &cancel,
            verify::verify(
                Some(llm),
                cache.as_deref(),
                config.llm_cache_only,
                &config.model,
                &markdown,
                excerpts.len(),
            ),
        )
        .await?;

        // Manifest + post-processing.
        let manifest = self.build_manifest(&excerpts, skipped, cache.is_some());
        let final_markdown = postproc::apply(
            &markdown,
            &PostProcessInputs {
                outline: &plan.outline,
                verification: Some(&verification),
                manifest: &manifest,
                toc_threshold: config.toc_threshold,
                today: Utc::now().date_naive(),
            },
        );

        // Bundle.
        let report_path = bundle.write_text("report.md", &final_markdown)?;
        persist_json(&bundle, "manifest.json", &manifest);
        let evidence = postproc::evidence_section(&verification);
        persist_text(&bundle, "evidence.md", &evidence);
        if let Err(e) = bundle.write_checksums() {
            warn!(error = %e, "failed to write SHA256SUMS");
        }
        if config.make_tarball
            && let Err(e) = bundle.pack_tarball()
        {
            warn!(error = %e, "failed to pack tarball");
        }

        info!(stats = ?stats, "run complete");
        Ok(RunOutput {
            markdown: final_markdown,
            bundle_dir: bundle.dir().to_path_buf(),
            report_path,
            manifest,
            stats,
        })
    }

    /// Dry-run completion: a deterministic textual report with the
    /// planned queries, selected URLs, and a budget estimate, still
    /// post-processed so the footer and manifest appear for parity.
    #[allow(clippy::too_many_arguments)]
    fn finish_dry_run(
        &self,
        bundle: &Bundle,
        brief: &Brief,
        template: &'static Template,
        plan: &Plan,
        selected: &[SearchResult],
        cache_enabled: bool,
        stats: RunStats,
    ) -> Result<RunOutput, Error> {
        let config = &self.config;
        let today = Utc::now().date_naive();

        let mut report = format!("# {}\n\n{}\n\n", brief.topic_or_default(), today.format("%Y-%m-%d"));
        report.push_str("Dry run: no sources were fetched and no model was invoked.\n\n");

        report.push_str("Planned queries:\n\n");
        for (index, query) in plan.queries.iter().enumerate() {
            report.push_str(&format!("{}. {query}\n", index + 1));
        }

        report.push_str("\nSelected sources:\n\n");
        if selected.is_empty() {
            report.push_str("(none)\n");
        }
        for (index, result) in selected.iter().enumerate() {
            report.push_str(&format!("{}. {} \u{2014} {}\n", index + 1, result.title, result.url));
        }

        let estimate = self.dry_run_estimate(template, selected.len());
        report.push_str(&format!(
            "\nBudget estimate: model_context={}; prompt_tokens={}; reserved_output={}; remaining={}; fits={}\n",
            estimate.model_context,
            estimate.prompt_tokens,
            estimate.reserved_output,
            estimate.remaining,
            estimate.fits
        ));

        let pseudo_excerpts: Vec<SourceExcerpt> = selected
            .iter()
            .enumerate()
            .map(|(index, r)| SourceExcerpt::new(index + 1, r.title.clone(), r.url.clone(), ""))
            .collect();
        let manifest = self.build_manifest(&pseudo_excerpts, Vec::new(), cache_enabled);

        let final_markdown = postproc::apply(
            &report,
            &PostProcessInputs {
                outline: &[],
                verification: None,
                manifest: &manifest,
                toc_threshold: config.toc_threshold,
                today,
            },
        );

        let report_path = bundle.write_text("report.md", &final_markdown)?;
        persist_json(bundle, "manifest.json", &manifest);
        if let Err(e) = bundle.write_checksums() {
            warn!(error = %e, "failed to write SHA256SUMS");
        }

        Ok(RunOutput {
            markdown: final_markdown,
            bundle_dir: bundle.dir().to_path_buf(),
            report_path,
            manifest,
            stats,
        })
    }

    /// Conservative prompt estimate for dry-run parity output.
    fn dry_run_estimate(&self, template: &Template, source_count: usize) -> BudgetEstimate {
        let model = if self.config.model.is_empty() {
            "dry-run"
        } else {
            &self.config.model
        };
        budget::estimate_synthesis_budget(
            model,
            template.system_prompt,
            "",
            source_count,
            self.config.per_source_chars,
            self.config.reserved_output_tokens as usize,
        )
    }

    fn build_manifest(
        &self,
        excerpts: &[SourceExcerpt],
        skipped: Vec<SkippedSource>,
        cache_enabled: bool,
    ) -> Manifest {
        let config = &self.config;
        Manifest {
            meta: ManifestMeta {
                model: if config.model.is_empty() {
                    "dry-run".to_string()
                } else {
                    config.model.clone()
                },
                llm_base_url: config
                    .llm_base_url
                    .clone()
                    .unwrap_or_else(|| "default".to_string()),
                source_count: excerpts.len(),
                http_cache: cache_enabled && !config.fetch.bypass_cache,
                llm_cache: cache_enabled,
                generated_at_utc: Utc::now().to_rfc3339(),
            },
            entries: excerpts.iter().map(ManifestEntry::from_excerpt).collect(),
            skipped,
        }
    }

    fn open_cache(&self) -> Option<Arc<Cache>> {
        let result = if self.config.strict_cache_perms {
            Cache::open_strict(&self.config.cache_dir)
        } else {
            Cache::open(&self.config.cache_dir)
        };
        match result {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(error = %e, "cache unavailable; running uncached");
                None
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("search", &self.search.is_some())
            .field("llm", &self.llm.is_some())
            .field("fetcher_injected", &self.fetcher.is_some())
            .finish()
    }
}

/// Awaits a stage future unless the run is cancelled first.
async fn with_cancel<T>(
    cancel: &CancellationToken,
    future: impl std::future::Future<Output = T>,
) -> Result<T, Error> {
    tokio::select! {
        result = future => Ok(result),
        () = cancel.cancelled() => Err(PipelineError::Cancelled.into()),
    }
}

fn persist_json<T: Serialize>(bundle: &Bundle, name: &str, value: &T) {
    if let Err(e) = bundle.write_json(name, value) {
        warn!(artifact = name, error = %e, "failed to persist artifact");
    }
}

fn persist_text(bundle: &Bundle, name: &str, text: &str) {
    if let Err(e) = bundle.write_text(name, text) {
        warn!(artifact = name, error = %e, "failed to persist artifact");
    }
}
