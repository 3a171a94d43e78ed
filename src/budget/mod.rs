//! Token-budget engine.
//!
//! Fits prompts and source excerpts into a model context window with a
//! reserved output allowance. Token counts are estimated from byte length
//! with a conservative chars-per-token ratio; excerpt bodies are shrunk
//! proportionally so every source keeps its slot even under tight budgets.

use unicode_segmentation::UnicodeSegmentation;

use crate::core::SourceExcerpt;

/// Conservative byte-per-token estimate used throughout the pipeline.
pub const CHARS_PER_TOKEN: usize = 4;

/// Fixed additive overhead per message for role and framing tokens.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 8;

/// Context window assumed for models missing from the lookup table.
pub const DEFAULT_MODEL_CONTEXT: usize = 8_192;

/// Fixed buffer reserved on top of the prompt and the requested output.
pub const HEADROOM_TOKENS: usize = 256;

/// Per-source token allowance for the index/title/URL header lines in the
/// sources block.
const SOURCE_HEADER_TOKENS: usize = 24;

/// Known context windows, matched by substring in order. First hit wins,
/// so longer names precede their prefixes.
const MODEL_CONTEXTS: &[(&str, usize)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4.1", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-32k", 32_768),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo-16k", 16_384),
    ("gpt-3.5", 16_384),
    ("o3", 200_000),
    ("o1", 200_000),
    ("claude", 200_000),
    ("mixtral", 32_768),
    ("mistral", 32_768),
    ("qwen", 32_768),
    ("llama", 8_192),
];

/// Estimates token usage for one message's worth of text.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD_TOKENS
}

/// Returns the context window for a model, with a safe default for
/// unknown names.
#[must_use]
pub fn model_context(model: &str) -> usize {
    let lower = model.to_ascii_lowercase();
    MODEL_CONTEXTS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map_or(DEFAULT_MODEL_CONTEXT, |&(_, context)| context)
}

/// Fixed headroom reserved for a model.
///
/// Kept as a function of the model so per-model calibration stays a local
/// change.
#[must_use]
pub const fn headroom(_model: &str) -> usize {
    HEADROOM_TOKENS
}

/// Result of sizing a synthesis prompt against a model context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BudgetEstimate {
    /// Model context window in tokens.
    pub model_context: usize,
    /// Estimated prompt tokens (system + user, excerpt bodies included).
    pub prompt_tokens: usize,
    /// Tokens reserved for the model's output.
    pub reserved_output: usize,
    /// Tokens left after prompt, reserved output, and headroom.
    pub remaining: usize,
    /// Whether prompt + reserved output + headroom fit the context.
    pub fits: bool,
}

/// Sizes a synthesis prompt conservatively, assuming `per_source_chars`
/// bytes of excerpt per selected source.
#[must_use]
pub fn estimate_synthesis_budget(
    model: &str,
    system_prompt: &str,
    user_skeleton: &str,
    source_count: usize,
    per_source_chars: usize,
    reserved_output: usize,
) -> BudgetEstimate {
    let context = model_context(model);
    let prompt_tokens = estimate_tokens(system_prompt)
        + estimate_tokens(user_skeleton)
        + source_count * (per_source_chars.div_ceil(CHARS_PER_TOKEN) + SOURCE_HEADER_TOKENS);
    let spoken_for = prompt_tokens + reserved_output + headroom(model);
    BudgetEstimate {
        model_context: context,
        prompt_tokens,
        reserved_output,
        remaining: context.saturating_sub(spoken_for),
        fits: spoken_for <= context,
    }
}

/// Fits excerpts into the model context by scaling each body length with
/// the ratio of available to current bytes.
///
/// Never drops a source: under extreme pressure bodies shrink to zero and
/// only the index/title/URL headers survive. Indices and order are
/// untouched. Returns the fitted excerpts and the post-fit estimate.
#[must_use]
pub fn fit_excerpts(
    excerpts: Vec<SourceExcerpt>,
    model: &str,
    system_prompt: &str,
    user_skeleton: &str,
    reserved_output: usize,
) -> (Vec<SourceExcerpt>, BudgetEstimate) {
    let context = model_context(model);
    let fixed_tokens = estimate_tokens(system_prompt)
        + estimate_tokens(user_skeleton)
        + excerpts.len() * SOURCE_HEADER_TOKENS
        + reserved_output
        + headroom(model);

    let body_budget_tokens = context.saturating_sub(fixed_tokens);
    let available_chars = body_budget_tokens.saturating_mul(CHARS_PER_TOKEN);

    let fitted = proportional_truncate(excerpts, available_chars);

    let body_chars: usize = fitted.iter().map(|e| e.excerpt.len()).sum();
    let prompt_tokens = fixed_tokens - reserved_output - headroom(model)
        + body_chars.div_ceil(CHARS_PER_TOKEN);
    let spoken_for = prompt_tokens + reserved_output + headroom(model);
    let estimate = BudgetEstimate {
        model_context: context,
        prompt_tokens,
        reserved_output,
        remaining: context.saturating_sub(spoken_for),
        fits: spoken_for <= context,
    };

    (fitted, estimate)
}

/// Scales each excerpt body so the total fits `available_chars`, keeping
/// every source and all UTF-8 grapheme boundaries intact.
#[must_use]
pub fn proportional_truncate(
    mut excerpts: Vec<SourceExcerpt>,
    available_chars: usize,
) -> Vec<SourceExcerpt> {
    let current: usize = excerpts.iter().map(|e| e.excerpt.len()).sum();
    if current <= available_chars {
        return excerpts;
    }
    if available_chars == 0 {
        for excerpt in &mut excerpts {
            excerpt.excerpt.clear();
        }
        return excerpts;
    }

    for excerpt in &mut excerpts {
        let len = excerpt.excerpt.len();
        // Scale by available/current; u128 avoids overflow on large sums.
        let scaled = usize::try_from(
            u128::from(len as u64) * u128::from(available_chars as u64) / u128::from(current as u64),
        )
        .unwrap_or(len);
        let end = grapheme_floor(&excerpt.excerpt, scaled);
        excerpt.excerpt.truncate(end);
    }
    excerpts
}

/// Truncates a string to at most `max_bytes`, never splitting a grapheme.
#[must_use]
pub fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    &s[..grapheme_floor(s, max_bytes)]
}

/// Largest byte offset `<= max_bytes` that lands on a grapheme boundary.
fn grapheme_floor(s: &str, max_bytes: usize) -> usize {
    if s.len() <= max_bytes {
        return s.len();
    }
    let mut end = 0;
    for (offset, grapheme) in s.grapheme_indices(true) {
        let next = offset + grapheme.len();
        if next > max_bytes {
            break;
        }
        end = next;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn excerpt(index: usize, body: &str) -> SourceExcerpt {
        SourceExcerpt::new(index, format!("Source {index}"), format!("https://example.com/{index}"), body)
    }

    #[test]
    fn test_estimate_tokens_includes_overhead() {
        assert_eq!(estimate_tokens(""), MESSAGE_OVERHEAD_TOKENS);
        assert_eq!(estimate_tokens("abcd"), 1 + MESSAGE_OVERHEAD_TOKENS);
        assert_eq!(estimate_tokens("abcde"), 2 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_model_context_lookup() {
        assert_eq!(model_context("gpt-4o-mini"), 128_000);
        assert_eq!(model_context("gpt-4"), 8_192);
        assert_eq!(model_context("Mistral-Small"), 32_768);
        assert_eq!(model_context("totally-unknown"), DEFAULT_MODEL_CONTEXT);
    }

    #[test]
    fn test_longer_names_match_before_prefixes() {
        assert_eq!(model_context("gpt-4-32k"), 32_768);
        assert_eq!(model_context("gpt-3.5-turbo-16k"), 16_384);
    }

    #[test]
    fn test_estimate_synthesis_budget_fits_flag() {
        let small = estimate_synthesis_budget("gpt-4", "sys", "user", 2, 1_000, 512);
        assert!(small.fits);
        assert!(small.remaining > 0);

        let huge = estimate_synthesis_budget("gpt-4", "sys", "user", 12, 50_000, 2_048);
        assert!(!huge.fits);
        assert_eq!(huge.remaining, 0);
    }

    #[test]
    fn test_truncate_no_pressure_is_identity() {
        let input = vec![excerpt(1, "short"), excerpt(2, "also short")];
        let out = proportional_truncate(input.clone(), 10_000);
        assert_eq!(out, input);
    }

    #[test]
    fn test_truncate_keeps_every_source() {
        let input = vec![excerpt(1, &"a".repeat(4_000)), excerpt(2, &"b".repeat(6_000))];
        let out = proportional_truncate(input, 5_000);
        assert_eq!(out.len(), 2);
        assert!(out[0].excerpt.len() < 4_000);
        assert!(out[1].excerpt.len() < 6_000);
        // Proportional: the larger excerpt keeps the larger share.
        assert!(out[1].excerpt.len() > out[0].excerpt.len());
        let total: usize = out.iter().map(|e| e.excerpt.len()).sum();
        assert!(total <= 5_000);
    }

    #[test]
    fn test_truncate_to_zero_retains_headers_only() {
        let input = vec![excerpt(1, "body one"), excerpt(2, "body two")];
        let out = proportional_truncate(input, 0);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.excerpt.is_empty()));
        assert_eq!(out[0].index, 1);
        assert_eq!(out[1].index, 2);
    }

    #[test]
    fn test_truncate_never_splits_multibyte() {
        let body = "héllo wörld ".repeat(500);
        let input = vec![excerpt(1, &body)];
        for budget in [1, 7, 13, 100, 1_001] {
            let out = proportional_truncate(input.clone(), budget);
            assert!(out[0].excerpt.len() <= budget);
            assert!(std::str::from_utf8(out[0].excerpt.as_bytes()).is_ok());
            assert!(body.starts_with(&out[0].excerpt));
        }
    }

    #[test]
    fn test_fit_excerpts_tight_context() {
        // Reserving most of gpt-4's 8k context leaves well under 10k
        // chars for excerpt bodies, forcing a proportional cut.
        let input = vec![excerpt(1, &"x".repeat(4_000)), excerpt(2, &"y".repeat(6_000))];
        let (out, estimate) = fit_excerpts(input, "gpt-4", "system prompt", "skeleton", 7_000);
        assert_eq!(out.len(), 2);
        assert!(out[0].excerpt.len() < 4_000);
        assert!(out[1].excerpt.len() < 6_000);
        assert!(estimate.fits);
        assert!(
            estimate.prompt_tokens + estimate.reserved_output + HEADROOM_TOKENS
                <= estimate.model_context
        );
    }

    proptest! {
        #[test]
        fn prop_truncate_preserves_count_and_bounds(
            bodies in proptest::collection::vec(".{0,400}", 1..8),
            budget in 0usize..4_000,
        ) {
            let input: Vec<SourceExcerpt> = bodies
                .iter()
                .enumerate()
                .map(|(i, b)| excerpt(i + 1, b))
                .collect();
            let out = proportional_truncate(input.clone(), budget);

            prop_assert_eq!(out.len(), input.len());
            for (before, after) in input.iter().zip(&out) {
                prop_assert!(after.excerpt.len() <= before.excerpt.len());
                prop_assert!(before.excerpt.starts_with(&after.excerpt));
                prop_assert_eq!(after.index, before.index);
            }
            let total: usize = out.iter().map(|e| e.excerpt.len()).sum();
            let original: usize = input.iter().map(|e| e.excerpt.len()).sum();
            if original > budget {
                prop_assert!(total <= budget);
            } else {
                prop_assert_eq!(total, original);
            }
        }
    }
}
