//! Report-type template registry.
//!
//! Maps a free-form report type from the brief to one of a closed set of
//! profiles. Each profile carries a canonical outline, the synthesis system
//! prompt, and an optional user-prompt hint. Selection is a pure function of
//! the normalized type; distinct profiles yield distinct system prompts.

/// Closed set of report profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportType {
    /// Introduction / Methods / Results / Discussion structure.
    Imrad,
    /// Decision brief with options and a recommendation.
    Decision,
    /// Literature review across themes.
    Literature,
    /// General-purpose research report.
    Default,
}

impl ReportType {
    /// Normalizes a free-form report type string.
    ///
    /// Exact names match first (`imrad`, `decision`, `literature`,
    /// `default`), then a substring heuristic: anything mentioning
    /// "imrad" or "technical" maps to [`ReportType::Imrad`], anything
    /// mentioning "review" to [`ReportType::Literature`], anything
    /// mentioning "decision" to [`ReportType::Decision`].
    #[must_use]
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Default;
        };
        let lower = raw.trim().to_ascii_lowercase();
        match lower.as_str() {
            "imrad" => return Self::Imrad,
            "decision" => return Self::Decision,
            "literature" => return Self::Literature,
            "default" | "" => return Self::Default,
            _ => {}
        }
        if lower.contains("imrad") || lower.contains("technical") {
            Self::Imrad
        } else if lower.contains("decision") {
            Self::Decision
        } else if lower.contains("review") || lower.contains("literature") {
            Self::Literature
        } else {
            Self::Default
        }
    }

    /// Profile name as used in manifests and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Imrad => "imrad",
            Self::Decision => "decision",
            Self::Literature => "literature",
            Self::Default => "default",
        }
    }
}

/// A report profile: outline, synthesis system prompt, optional user hint.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    /// Profile name.
    pub name: &'static str,
    /// Canonical section outline, ending with "References".
    pub outline: &'static [&'static str],
    /// Synthesis system prompt.
    pub system_prompt: &'static str,
    /// Optional extra hint appended to the synthesis user prompt.
    pub user_hint: Option<&'static str>,
}

/// Citation contract embedded verbatim in every profile's system prompt.
pub const CITATION_CONTRACT: &str = "Use ONLY the provided sources; do not draw on outside knowledge. \
Cite precisely: every factual claim carries bracketed numeric indices like [1] or [2][5] \
referring to the numbered sources. Do not invent sources, quotes, or URLs. \
If the sources do not cover a point, say so explicitly instead of guessing.";

const DEFAULT_SYSTEM_PROMPT: &str = concat!(
    "You are a careful research writer producing a structured Markdown report. ",
    "Use ONLY the provided sources; do not draw on outside knowledge. \
Cite precisely: every factual claim carries bracketed numeric indices like [1] or [2][5] \
referring to the numbered sources. Do not invent sources, quotes, or URLs. \
If the sources do not cover a point, say so explicitly instead of guessing.",
    " Write plainly, prefer short paragraphs, and keep every section grounded in the sources. ",
    "Where sources disagree, present the disagreement rather than resolving it silently."
);

const IMRAD_SYSTEM_PROMPT: &str = concat!(
    "You are a technical writer producing an IMRaD-structured Markdown report \
(Introduction, Methods, Results, Discussion). ",
    "Use ONLY the provided sources; do not draw on outside knowledge. \
Cite precisely: every factual claim carries bracketed numeric indices like [1] or [2][5] \
referring to the numbered sources. Do not invent sources, quotes, or URLs. \
If the sources do not cover a point, say so explicitly instead of guessing.",
    " Describe methodology and evidence quality explicitly, separate observed results from \
interpretation, and flag weak or single-source findings."
);

const DECISION_SYSTEM_PROMPT: &str = concat!(
    "You are an analyst producing a decision brief in Markdown for a reader who must choose \
between options. ",
    "Use ONLY the provided sources; do not draw on outside knowledge. \
Cite precisely: every factual claim carries bracketed numeric indices like [1] or [2][5] \
referring to the numbered sources. Do not invent sources, quotes, or URLs. \
If the sources do not cover a point, say so explicitly instead of guessing.",
    " Lay out options with their trade-offs, state the recommendation and its conditions, \
and make the cost of being wrong visible."
);

const LITERATURE_SYSTEM_PROMPT: &str = concat!(
    "You are a reviewer producing a literature-style Markdown survey organized by theme. ",
    "Use ONLY the provided sources; do not draw on outside knowledge. \
Cite precisely: every factual claim carries bracketed numeric indices like [1] or [2][5] \
referring to the numbered sources. Do not invent sources, quotes, or URLs. \
If the sources do not cover a point, say so explicitly instead of guessing.",
    " Group related sources, contrast their claims and scope, and note where the literature \
is thin or contradictory."
);

static DEFAULT_TEMPLATE: Template = Template {
    name: "default",
    outline: &[
        "Executive summary",
        "Background",
        "Key findings",
        "Analysis",
        "Alternatives & conflicting evidence",
        "Risks and limitations",
        "References",
    ],
    system_prompt: DEFAULT_SYSTEM_PROMPT,
    user_hint: None,
};

static IMRAD_TEMPLATE: Template = Template {
    name: "imrad",
    outline: &[
        "Executive summary",
        "Introduction",
        "Methods",
        "Results",
        "Discussion",
        "Alternatives & conflicting evidence",
        "Risks and limitations",
        "References",
    ],
    system_prompt: IMRAD_SYSTEM_PROMPT,
    user_hint: Some(
        "Keep Methods and Results strictly descriptive; interpretation belongs in Discussion.",
    ),
};

static DECISION_TEMPLATE: Template = Template {
    name: "decision",
    outline: &[
        "Executive summary",
        "Context",
        "Options",
        "Recommendation",
        "Alternatives & conflicting evidence",
        "Risks and limitations",
        "References",
    ],
    system_prompt: DECISION_SYSTEM_PROMPT,
    user_hint: Some("End the Recommendation section with the conditions under which it changes."),
};

static LITERATURE_TEMPLATE: Template = Template {
    name: "literature",
    outline: &[
        "Executive summary",
        "Scope and method",
        "Themes",
        "Synthesis",
        "Alternatives & conflicting evidence",
        "Risks and limitations",
        "References",
    ],
    system_prompt: LITERATURE_SYSTEM_PROMPT,
    user_hint: None,
};

/// Returns the profile for a normalized report type.
#[must_use]
pub const fn template_for(kind: ReportType) -> &'static Template {
    match kind {
        ReportType::Imrad => &IMRAD_TEMPLATE,
        ReportType::Decision => &DECISION_TEMPLATE,
        ReportType::Literature => &LITERATURE_TEMPLATE,
        ReportType::Default => &DEFAULT_TEMPLATE,
    }
}

/// All registered profiles, for validation and tests.
#[must_use]
pub const fn all_templates() -> [&'static Template; 4] {
    [
        &DEFAULT_TEMPLATE,
        &IMRAD_TEMPLATE,
        &DECISION_TEMPLATE,
        &LITERATURE_TEMPLATE,
    ]
}
