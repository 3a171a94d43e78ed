//! Claim extraction and citation mapping.
//!
//! LLM-first: a strict-JSON prompt at temperature 0.0 extracts 5-12
//! claims with their inline citations and a confidence grade. On any
//! failure the deterministic fallback splits the body into sentences and
//! grades them by citation count, so verification never blocks a run.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::Cache;
use crate::error::LlmError;
use crate::llm::{ChatProvider, ChatRequest, chat_cached, system_message, user_message};

/// Maximum claims kept in a verification result.
pub const MAX_CLAIMS: usize = 12;

#[allow(clippy::unwrap_used)]
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

const VERIFIER_SYSTEM_PROMPT: &str = "\
You are a fact-check assistant. Extract the report's main factual claims \
and map each to its bracketed citation indices. Respond with STRICT JSON \
only, no prose and no code fences, in exactly this shape:
{\"claims\": [{\"text\": \"...\", \"citations\": [1], \"confidence\": \"high\"}]}
Rules:
- 5 to 12 claims, quoted or tightly paraphrased from the report.
- citations lists the [n] indices attached to the claim; empty if none.
- confidence is \"high\", \"medium\", or \"low\".";

/// Confidence grade for a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Two or more citations, or strong LLM confidence.
    High,
    /// Exactly one citation.
    Medium,
    /// No citations.
    Low,
}

/// One extracted claim with its citation mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim text.
    pub text: String,
    /// Sorted, deduplicated 1-based source indices cited by the claim.
    pub citations: Vec<usize>,
    /// Confidence grade.
    pub confidence: Confidence,
    /// Whether at least one citation backs the claim.
    pub supported: bool,
}

/// Verification output: graded claims plus a one-line summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Extracted claims, cited claims first.
    pub claims: Vec<Claim>,
    /// Summary line for the evidence appendix.
    pub summary: String,
}

/// Verifies a report body. The LLM path is tried when a provider is
/// given; every failure degrades to the deterministic fallback.
pub async fn verify(
    provider: Option<&dyn ChatProvider>,
    cache: Option<&Cache>,
    cache_only: bool,
    model: &str,
    body: &str,
    source_count: usize,
) -> VerificationResult {
    if let Some(provider) = provider {
        match llm_verify(provider, cache, cache_only, model, body, source_count).await {
            Ok(result) => return result,
            Err(e) => {
                warn!(error = %e, "verifier LLM failed; using deterministic fallback");
            }
        }
    }
    verify_offline(body)
}

async fn llm_verify(
    provider: &dyn ChatProvider,
    cache: Option<&Cache>,
    cache_only: bool,
    model: &str,
    body: &str,
    source_count: usize,
) -> Result<VerificationResult, LlmError> {
    let user = format!("Report:\n\n{body}");
    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![system_message(VERIFIER_SYSTEM_PROMPT), user_message(&user)],
        temperature: Some(0.0),
        max_tokens: Some(1_536),
        n: Some(1),
    };

    let (response, _from_cache) = chat_cached(provider, cache, cache_only, &request).await?;
    parse_verification(&response.content, source_count)
}

#[derive(Debug, Deserialize)]
struct RawVerification {
    claims: Vec<RawClaim>,
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    text: String,
    #[serde(default)]
    citations: Vec<usize>,
    #[serde(default)]
    confidence: Option<Confidence>,
}

/// Parses and normalizes the model's JSON verification: trimmed texts,
/// sorted in-range citations, derived support flags, capped claim count.
pub fn parse_verification(
    content: &str,
    source_count: usize,
) -> Result<VerificationResult, LlmError> {
    let stripped = strip_fences(content.trim());
    let raw: RawVerification = serde_json::from_str(stripped)?;
    if raw.claims.is_empty() {
        return Err(LlmError::Parse("verification contained no claims".to_string()));
    }

    let mut claims: Vec<Claim> = raw
        .claims
        .into_iter()
        .filter_map(|c| {
            let text = c.text.trim().to_string();
            if text.is_empty() {
                return None;
            }
            let mut citations: Vec<usize> = c
                .citations
                .into_iter()
                .filter(|&n| n >= 1 && (source_count == 0 || n <= source_count))
                .collect();
            citations.sort_unstable();
            citations.dedup();
            let supported = !citations.is_empty();
            let confidence = c.confidence.unwrap_or(if supported {
                Confidence::Medium
            } else {
                Confidence::Low
            });
            Some(Claim {
                text,
                citations,
                confidence,
                supported,
            })
        })
        .collect();

    claims.truncate(MAX_CLAIMS);
    let summary = summarize(&claims);
    Ok(VerificationResult { claims, summary })
}

fn strip_fences(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
    rest.rsplit_once("```").map_or(rest, |(body, _)| body).trim()
}

/// Deterministic fallback: sentence-split the body and grade each
/// sentence by its inline citations.
#[must_use]
pub fn verify_offline(body: &str) -> VerificationResult {
    let mut claims: Vec<Claim> = Vec::new();

    for sentence in body.split(['.', '?', '!', '\n']) {
        let text = sentence.trim();
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        let words = text.split_whitespace().count();
        if letters < 10 || words < 8 {
            continue;
        }

        let mut citations: Vec<usize> = CITATION_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
            .collect();
        citations.sort_unstable();
        citations.dedup();

        let confidence = match citations.len() {
            0 => Confidence::Low,
            1 => Confidence::Medium,
            _ => Confidence::High,
        };
        claims.push(Claim {
            text: text.to_string(),
            supported: !citations.is_empty(),
            citations,
            confidence,
        });
    }

    // Stable: cited claims first, original order within each group.
    claims.sort_by_key(|c| !c.supported);
    claims.truncate(MAX_CLAIMS);

    let summary = summarize(&claims);
    VerificationResult { claims, summary }
}

fn summarize(claims: &[Claim]) -> String {
    let supported = claims.iter().filter(|c| c.supported).count();
    let low = claims
        .iter()
        .filter(|c| c.confidence == Confidence::Low)
        .count();
    format!(
        "{} claims extracted; {supported} supported; {low} low-confidence.",
        claims.len()
    )
}
