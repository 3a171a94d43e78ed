//! # groundwork
//!
//! Citation-grounded research reports from a short natural-language
//! brief. Given a topic and optional audience/tone/length hints,
//! groundwork plans web queries, retrieves candidates from a meta-search
//! backend, fetches and extracts readable text politely, fits the
//! evidence into the model context, synthesizes a structured Markdown
//! report under a strict source-only citation contract, fact-checks it,
//! and emits a reproducible artifact bundle.
//!
//! ## Pipeline
//!
//! - **Planning**: LLM-first JSON plan with a deterministic fallback
//! - **Search**: serial meta-search queries, stable dedupe, per-domain caps
//! - **Fetching**: bounded worker pool, robots/opt-out enforcement,
//!   per-host pacing, content-addressed HTTP cache
//! - **Extraction**: boilerplate-stripped HTML text, optional PDF text
//! - **Budgeting**: proportional excerpt truncation into the context window
//! - **Synthesis + verification**: cached chat completions with
//!   prompt-shrinking recovery and a claim-level evidence check
//! - **Bundling**: manifest, digests, and a deterministic tarball

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod budget;
pub mod bundle;
pub mod cache;
pub mod cli;
pub mod core;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod llm;
pub mod pipeline;
pub mod planner;
pub mod postproc;
pub mod search;
pub mod synth;
pub mod verify;

// Re-export commonly used types at crate root
pub use error::{Error, PipelineError, Result};

// Re-export core domain types
pub use core::{Brief, ExtractedDoc, ReportType, SourceExcerpt, Template};

// Re-export the driver types
pub use pipeline::{Pipeline, PipelineConfig, RunOutput, RunStats};

// Re-export the bundle types
pub use bundle::{Manifest, ManifestEntry, ManifestMeta};
