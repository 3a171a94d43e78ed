//! Core domain types: the research brief, the report-type template
//! registry, and the source excerpt types shared across pipeline stages.

pub mod brief;
pub mod excerpt;
pub mod template;

pub use brief::{Brief, FALLBACK_TOPIC};
pub use excerpt::{ExtractedDoc, SourceExcerpt};
pub use template::{ReportType, Template, all_templates, template_for};
