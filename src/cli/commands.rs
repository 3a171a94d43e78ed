//! Command execution: builds configuration from parsed flags and drives
//! the library. Returns the text printed to stdout on success; error
//! mapping to exit codes happens in the binary.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::parser::{CacheAction, Cli, Commands, ReportArgs};
use crate::bundle::{default_report_path, write_atomic};
use crate::cache::Cache;
use crate::core::{Brief, ReportType, template_for};
use crate::error::{Error, PipelineError};
use crate::fetch::{DomainPolicy, FetchConfig};
use crate::llm::{ChatProvider, OpenAiChat};
use crate::pipeline::{Pipeline, PipelineConfig};

/// Executes the parsed CLI command.
///
/// # Errors
///
/// Propagates configuration, I/O, and pipeline errors; the two pipeline
/// sentinels reach the binary unchanged for exit-code mapping.
pub async fn execute(cli: Cli, cancel: CancellationToken) -> Result<String, Error> {
    match cli.command {
        Commands::Report(args) => run_report(*args, cli.cache_dir, cancel).await,
        Commands::Plan {
            input,
            model,
            llm_base_url,
        } => run_plan(input, model, llm_base_url, cli.cache_dir, cancel).await,
        Commands::Cache { action } => run_cache(&action, cli.cache_dir),
    }
}

async fn run_report(
    args: ReportArgs,
    cache_dir: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<String, Error> {
    let brief_text = std::fs::read_to_string(&args.input)?;

    let fetch = FetchConfig {
        max_attempts: 2,
        per_request_timeout: Duration::from_secs(args.timeout_secs),
        concurrency: args.concurrency,
        bypass_cache: args.bypass_cache,
        cache_only: args.cache_only,
        verify_tls: !args.insecure_skip_tls_verify,
        robots_override_domains: args.robots_overrides,
        robots_override_confirm: args.robots_override_confirm,
        domain_policy: DomainPolicy {
            allow: args.allow_domains,
            deny: args.deny_domains,
            allow_private_hosts: args.allow_private_hosts,
        },
        ..FetchConfig::default()
    };

    let mut builder = PipelineConfig::builder()
        .reports_dir(args.reports_dir.clone())
        .max_sources(args.max_sources)
        .per_domain_cap(args.per_domain)
        .reserved_output_tokens(args.reserved_output_tokens)
        .llm_cache_only(args.cache_only)
        .dry_run(args.dry_run)
        .enable_pdf(args.enable_pdf)
        .make_tarball(args.tarball)
        .strict_cache_perms(args.strict_cache_perms)
        .fetch(fetch);
    if let Some(model) = args.model {
        builder = builder.model(model);
    }
    if let Some(url) = args.llm_base_url {
        builder = builder.llm_base_url(url);
    }
    if let Some(url) = args.search_url {
        builder = builder.search_base_url(url);
    }
    if let Some(language) = args.language {
        builder = builder.preferred_language(language);
    }
    if let Some(dir) = cache_dir {
        builder = builder.cache_dir(dir);
    }
    let config = builder.from_env().build()?;

    let topic = Brief::parse(&brief_text).topic_or_default().to_string();
    let output_path = args
        .output
        .unwrap_or_else(|| default_report_path(&args.reports_dir, &topic));

    let pipeline = Pipeline::new(config)?;
    let run = pipeline.run(&brief_text, cancel).await?;

    // Write the report to the requested output path, with the manifest
    // sidecar alongside it.
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic(&output_path, run.markdown.as_bytes())?;
    let sidecar = PathBuf::from(format!("{}.manifest.json", output_path.display()));
    let manifest_json = serde_json::to_vec_pretty(&run.manifest)?;
    write_atomic(&sidecar, &manifest_json)?;

    Ok(format!(
        "report written to {}\nbundle: {}\nsources used: {}; skipped: {}\n",
        output_path.display(),
        run.bundle_dir.display(),
        run.manifest.entries.len(),
        run.manifest.skipped.len()
    ))
}

async fn run_plan(
    input: PathBuf,
    model: Option<String>,
    llm_base_url: Option<String>,
    cache_dir: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<String, Error> {
    let brief_text = std::fs::read_to_string(&input)?;
    let brief = Brief::parse(&brief_text);
    let template = template_for(ReportType::normalize(brief.report_type.as_deref()));

    let cache = cache_dir.and_then(|dir| Cache::open(dir).ok());
    let provider: Option<Box<dyn ChatProvider>> = model
        .as_ref()
        .filter(|m| !m.is_empty())
        .map(|_| Box::new(OpenAiChat::new("sk-local", llm_base_url.as_deref())) as Box<dyn ChatProvider>);

    let model = model.unwrap_or_default();
    let plan_future = crate::planner::plan(
        provider.as_deref(),
        cache.as_ref(),
        false,
        &model,
        &brief,
        template,
        None,
    );
    let plan = tokio::select! {
        plan = plan_future => plan,
        () = cancel.cancelled() => return Err(PipelineError::Cancelled.into()),
    };

    let mut json = serde_json::to_string_pretty(&plan)?;
    json.push('\n');
    Ok(json)
}

fn run_cache(action: &CacheAction, cache_dir: Option<PathBuf>) -> Result<String, Error> {
    let dir = cache_dir.unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("groundwork")
    });
    let cache = Cache::open(&dir)?;

    match action {
        CacheAction::Purge { older_than_days } => {
            let age = Duration::from_secs(older_than_days * 24 * 60 * 60);
            let removed = cache.purge_older_than(age)?;
            Ok(format!("purged {removed} entries older than {older_than_days} days\n"))
        }
        CacheAction::Clear => {
            cache.clear()?;
            Ok("cache cleared\n".to_string())
        }
        CacheAction::Stats => {
            let stats = cache.stats()?;
            Ok(format!(
                "http: {} entries, {} bytes\nllm: {} entries, {} bytes\n",
                stats.http_entries, stats.http_bytes, stats.llm_entries, stats.llm_bytes
            ))
        }
    }
}
