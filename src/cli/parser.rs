//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros. This is a thin
//! collaborator over the library: flags map directly onto
//! [`PipelineConfig`](crate::pipeline::PipelineConfig) fields.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// groundwork: citation-grounded research reports from a short brief.
///
/// Plans web queries, fetches and extracts sources politely, and
/// synthesizes a verified Markdown report with a reproducibility
/// manifest.
#[derive(Parser, Debug)]
#[command(name = "groundwork")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Cache root directory.
    #[arg(long, global = true, env = "GROUNDWORK_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a research report from a brief file.
    Report(Box<ReportArgs>),

    /// Print the planner output (queries + outline) for a brief as JSON.
    Plan {
        /// Path to the brief (Markdown).
        input: PathBuf,

        /// Model for LLM-first planning; omit for the deterministic
        /// fallback.
        #[arg(long, env = "GROUNDWORK_MODEL")]
        model: Option<String>,

        /// LLM endpoint base URL.
        #[arg(long, env = "OPENAI_BASE_URL")]
        llm_base_url: Option<String>,
    },

    /// Inspect or maintain the HTTP and LLM caches.
    Cache {
        /// The cache operation.
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Cache maintenance operations.
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove entries older than the given age.
    Purge {
        /// Age threshold in days.
        #[arg(long, default_value = "30")]
        older_than_days: u64,
    },

    /// Remove every cache entry.
    Clear,

    /// Show entry counts and sizes per bucket.
    Stats,
}

/// Arguments for the `report` command.
#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    /// Path to the brief (Markdown; first H1 is the topic).
    pub input: PathBuf,

    /// Output path for the report. Defaults to
    /// `{reports_dir}/{slug}-{hash}.md`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Model identifier (required unless --dry-run).
    #[arg(long, env = "GROUNDWORK_MODEL")]
    pub model: Option<String>,

    /// LLM endpoint base URL (OpenAI-compatible).
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// Meta-search endpoint base URL (SearXNG-compatible).
    #[arg(long, env = "GROUNDWORK_SEARCH_URL")]
    pub search_url: Option<String>,

    /// Directory for artifact bundles.
    #[arg(long, default_value = "reports", env = "GROUNDWORK_REPORTS_DIR")]
    pub reports_dir: PathBuf,

    /// Plan and select only; skip fetching and synthesis.
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum selected sources.
    #[arg(long, default_value = "12")]
    pub max_sources: usize,

    /// Maximum sources per registrable domain.
    #[arg(long, default_value = "3")]
    pub per_domain: usize,

    /// Preferred result and report language (e.g. en).
    #[arg(long)]
    pub language: Option<String>,

    /// Tokens reserved for the model's output.
    #[arg(long, default_value = "2048")]
    pub reserved_output_tokens: u32,

    /// Concurrent fetch workers.
    #[arg(long, default_value = "8")]
    pub concurrency: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value = "15")]
    pub timeout_secs: u64,

    /// Serve HTTP and LLM calls only from cache; any miss fails fast.
    #[arg(long)]
    pub cache_only: bool,

    /// Skip cache reads (responses are still stored).
    #[arg(long)]
    pub bypass_cache: bool,

    /// Create cache files with owner-only permissions.
    #[arg(long)]
    pub strict_cache_perms: bool,

    /// Enable the naive PDF text path.
    #[arg(long)]
    pub enable_pdf: bool,

    /// Pack the bundle into a tar.gz next to the bundle directory.
    #[arg(long)]
    pub tarball: bool,

    /// Restrict fetching to these hosts (repeatable).
    #[arg(long = "allow-domain")]
    pub allow_domains: Vec<String>,

    /// Never fetch these hosts (repeatable; wins over allow).
    #[arg(long = "deny-domain")]
    pub deny_domains: Vec<String>,

    /// Permit loopback and private hosts (local fixture servers).
    #[arg(long)]
    pub allow_private_hosts: bool,

    /// Hosts where robots/opt-out may be overridden (repeatable).
    /// Takes effect only together with --robots-override-confirm.
    #[arg(long = "robots-override")]
    pub robots_overrides: Vec<String>,

    /// Confirm the robots override. Both keys are required.
    #[arg(long)]
    pub robots_override_confirm: bool,

    /// Skip TLS certificate verification (self-signed deployments).
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_report_defaults() {
        let cli = Cli::try_parse_from(["groundwork", "report", "brief.md", "--model", "m"])
            .unwrap_or_else(|_| unreachable!());
        let Commands::Report(args) = cli.command else {
            unreachable!()
        };
        assert_eq!(args.max_sources, 12);
        assert_eq!(args.per_domain, 3);
        assert_eq!(args.concurrency, 8);
        assert_eq!(args.timeout_secs, 15);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_repeatable_domain_flags() {
        let cli = Cli::try_parse_from([
            "groundwork",
            "report",
            "brief.md",
            "--dry-run",
            "--deny-domain",
            "a.example",
            "--deny-domain",
            "b.example",
        ])
        .unwrap_or_else(|_| unreachable!());
        let Commands::Report(args) = cli.command else {
            unreachable!()
        };
        assert_eq!(args.deny_domains, vec!["a.example", "b.example"]);
    }

    #[test]
    fn test_cache_subcommands() {
        let cli = Cli::try_parse_from(["groundwork", "cache", "purge", "--older-than-days", "7"])
            .unwrap_or_else(|_| unreachable!());
        let Commands::Cache { action } = cli.command else {
            unreachable!()
        };
        assert!(matches!(action, CacheAction::Purge { older_than_days: 7 }));
    }
}
