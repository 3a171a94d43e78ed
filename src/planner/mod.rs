//! Query and outline planning.
//!
//! LLM-first: a strict-JSON prompt produces 6-10 search queries and a
//! 5-8 heading outline, with at least two counter-evidence queries. Any
//! parse failure or thin response falls back to a deterministic query set
//! built from the topic and the template registry's outline. Both paths
//! pass the same sanitization and augmentation, so the planner invariants
//! hold regardless of which produced the plan.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::Cache;
use crate::core::{Brief, Template};
use crate::error::LlmError;
use crate::llm::{ChatProvider, ChatRequest, chat_cached, system_message, user_message};

/// Minimum planned queries.
pub const MIN_QUERIES: usize = 6;
/// Maximum planned queries.
pub const MAX_QUERIES: usize = 10;
/// Minimum outline headings.
pub const MIN_OUTLINE: usize = 5;
/// Maximum outline headings.
pub const MAX_OUTLINE: usize = 8;

/// Heading every outline must contain.
pub const ALTERNATIVES_HEADING: &str = "Alternatives & conflicting evidence";

/// Counter-evidence query suffixes, appended in order until the plan
/// carries at least two.
const COUNTER_SUFFIXES: &[&str] = &["limitations", "contrary findings", "alternatives", "criticisms"];

/// Deterministic fallback query suffixes.
const FALLBACK_SUFFIXES: &[&str] = &[
    "specification",
    "documentation",
    "reference",
    "tutorial",
    "best practices",
    "faq",
    "examples",
    "comparison",
    "limitations",
    "contrary findings",
    "alternatives",
];

#[allow(clippy::unwrap_used)]
static COUNTER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)limitations|contrary|alternatives|criticism").unwrap());

/// Planner system prompt demanding strict JSON output.
const PLANNER_SYSTEM_PROMPT: &str = "\
You are a research planner. Given a topic and audience, produce web search \
queries and a report outline. Respond with STRICT JSON only, no prose and no \
code fences, in exactly this shape:
{\"queries\": [\"...\"], \"outline\": [\"...\"]}
Rules:
- 6 to 10 queries, each a concrete web search phrase.
- At least 2 queries must hunt for counter-evidence: limitations, contrary \
findings, alternatives, or criticisms.
- 5 to 8 outline headings, including \"Alternatives & conflicting evidence\", \
ending with \"References\".";

/// Planner output: search queries plus report outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Distinct search queries, 6-10, with >=2 counter-evidence queries.
    pub queries: Vec<String>,
    /// Section headings, 5-8, ending with "References".
    pub outline: Vec<String>,
}

/// Whether a query hunts for counter-evidence.
#[must_use]
pub fn is_counter_query(query: &str) -> bool {
    COUNTER_RE.is_match(query)
}

/// Produces a plan, preferring the LLM and falling back deterministically.
pub async fn plan(
    provider: Option<&dyn ChatProvider>,
    cache: Option<&Cache>,
    cache_only: bool,
    model: &str,
    brief: &Brief,
    template: &Template,
    language: Option<&str>,
) -> Plan {
    if let Some(provider) = provider {
        match llm_plan(provider, cache, cache_only, model, brief).await {
            Ok(raw) => return finalize(raw, brief, template, language),
            Err(e) => {
                warn!(error = %e, "planner LLM failed; using deterministic fallback");
            }
        }
    }
    finalize(fallback_plan(brief, language), brief, template, language)
}

async fn llm_plan(
    provider: &dyn ChatProvider,
    cache: Option<&Cache>,
    cache_only: bool,
    model: &str,
    brief: &Brief,
) -> Result<Plan, LlmError> {
    let mut user = format!("Topic: {}\n", brief.topic_or_default());
    if let Some(audience) = &brief.audience {
        user.push_str(&format!("Audience: {audience}\n"));
    }
    if let Some(tone) = &brief.tone {
        user.push_str(&format!("Tone: {tone}\n"));
    }
    user.push_str("Plan the queries and outline.");

    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![system_message(PLANNER_SYSTEM_PROMPT), user_message(&user)],
        temperature: Some(0.1),
        max_tokens: Some(1_024),
        n: Some(1),
    };

    let (response, _from_cache) = chat_cached(provider, cache, cache_only, &request).await?;
    parse_plan(&response.content)
}

/// Parses the model's JSON plan strictly. Tolerates surrounding code
/// fences but nothing else.
pub fn parse_plan(content: &str) -> Result<Plan, LlmError> {
    let stripped = strip_fences(content.trim());
    let plan: Plan = serde_json::from_str(stripped)?;
    if plan.queries.len() < 3 || plan.outline.len() < 3 {
        return Err(LlmError::Parse(format!(
            "plan too thin: {} queries, {} headings",
            plan.queries.len(),
            plan.outline.len()
        )));
    }
    Ok(plan)
}

fn strip_fences(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    // Skip the info string (e.g. "json") through the first newline.
    let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
    rest.rsplit_once("```").map_or(rest, |(body, _)| body).trim()
}

/// Deterministic fallback query set from the topic, with the language
/// hint appended when set.
#[must_use]
pub fn fallback_plan(brief: &Brief, language: Option<&str>) -> Plan {
    let topic = brief.topic_or_default();
    let queries = FALLBACK_SUFFIXES
        .iter()
        .take(MAX_QUERIES)
        .map(|suffix| {
            language.map_or_else(
                || format!("{topic} {suffix}"),
                |lang| format!("{topic} {suffix} ({lang})"),
            )
        })
        .collect();
    Plan {
        queries,
        outline: Vec::new(),
    }
}

/// Sanitizes, augments, and clamps a raw plan into its invariants.
fn finalize(raw: Plan, brief: &Brief, template: &Template, language: Option<&str>) -> Plan {
    let topic = brief.topic_or_default();

    let mut queries = sanitize_queries(&raw.queries);

    // Guarantee at least two counter-evidence queries.
    let mut counters = queries.iter().filter(|q| is_counter_query(q)).count();
    for suffix in COUNTER_SUFFIXES {
        if counters >= 2 || queries.len() >= MAX_QUERIES {
            break;
        }
        let candidate = format!("{topic} {suffix}");
        if !contains_case_insensitive(&queries, &candidate) {
            queries.push(candidate);
            counters += 1;
        }
    }

    // Pad thin plans from the fallback set, then clamp.
    if queries.len() < MIN_QUERIES {
        for query in fallback_plan(brief, language).queries {
            if queries.len() >= MIN_QUERIES {
                break;
            }
            if !contains_case_insensitive(&queries, &query) {
                queries.push(query);
            }
        }
    }
    queries.truncate(MAX_QUERIES);

    let outline = if raw.outline.is_empty() {
        template.outline.iter().map(ToString::to_string).collect()
    } else {
        finalize_outline(sanitize_outline(&raw.outline), template)
    };

    Plan { queries, outline }
}

/// Trims, strips trailing punctuation, and dedupes case-insensitively.
/// Idempotent.
#[must_use]
pub fn sanitize_queries(queries: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for query in queries {
        let cleaned = query.trim().trim_end_matches(['.', ',', ';', ':', '!', '?']).trim();
        if cleaned.is_empty() {
            continue;
        }
        if !contains_case_insensitive(&out, cleaned) {
            out.push(cleaned.to_string());
        }
    }
    out
}

/// Trims headings and strips leading `#` markers. Idempotent.
#[must_use]
pub fn sanitize_outline(outline: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for heading in outline {
        let cleaned = heading.trim().trim_start_matches('#').trim();
        if cleaned.is_empty() {
            continue;
        }
        if !contains_case_insensitive(&out, cleaned) {
            out.push(cleaned.to_string());
        }
    }
    out
}

/// Enforces the outline invariants: contains the alternatives heading,
/// ends with "References", and holds 5-8 headings.
fn finalize_outline(mut outline: Vec<String>, template: &Template) -> Vec<String> {
    if !contains_case_insensitive(&outline, ALTERNATIVES_HEADING) {
        let position = outline
            .iter()
            .position(|h| h.eq_ignore_ascii_case("Risks and limitations"))
            .or_else(|| {
                outline
                    .iter()
                    .position(|h| h.eq_ignore_ascii_case("References"))
            })
            .unwrap_or(outline.len());
        outline.insert(position, ALTERNATIVES_HEADING.to_string());
    }

    outline.retain(|h| !h.eq_ignore_ascii_case("References"));
    outline.push("References".to_string());

    // Pad thin outlines from the template, keeping References last.
    if outline.len() < MIN_OUTLINE {
        for heading in template.outline {
            if outline.len() >= MIN_OUTLINE {
                break;
            }
            if !contains_case_insensitive(&outline, heading) {
                let at = outline.len() - 1;
                outline.insert(at, (*heading).to_string());
            }
        }
    }

    // Trim oversized outlines from the middle, never a required heading.
    while outline.len() > MAX_OUTLINE {
        let removable = outline.iter().rposition(|h| {
            !h.eq_ignore_ascii_case("References")
                && !h.eq_ignore_ascii_case(ALTERNATIVES_HEADING)
                && !h.eq_ignore_ascii_case("Executive summary")
                && !h.eq_ignore_ascii_case("Risks and limitations")
        });
        match removable {
            Some(at) => {
                outline.remove(at);
            }
            None => break,
        }
    }

    outline
}

fn contains_case_insensitive(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|h| h.eq_ignore_ascii_case(needle))
}
