//! Report synthesis.
//!
//! One system message (template-selected) plus one user message carrying
//! the document skeleton, brief fields, language hint, and the numbered
//! sources block. The model must answer with Markdown only, under the
//! source-only citation contract. Recovery on provider rejection shrinks
//! the prompt in two steps: headers-only excerpts, then merging the
//! system prompt into the user message.

use std::time::Duration;

use tracing::warn;

use crate::budget::{estimate_tokens, headroom, model_context};
use crate::cache::Cache;
use crate::core::{Brief, SourceExcerpt, Template};
use crate::error::{Error, LlmError, PipelineError};
use crate::llm::{ChatProvider, ChatRequest, chat_cached, system_message, user_message};

/// Floor for the output allowance even under extreme prompt pressure.
const MIN_OUTPUT_TOKENS: u32 = 64;

/// Pause before the single transient-failure retry.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Everything the synthesizer needs for one call.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    /// Model identifier.
    pub model: &'a str,
    /// The parsed brief.
    pub brief: &'a Brief,
    /// Selected report template.
    pub template: &'a Template,
    /// Planned outline headings.
    pub outline: &'a [String],
    /// Budget-fitted source excerpts, numbered 1..N.
    pub excerpts: &'a [SourceExcerpt],
    /// Preferred output language.
    pub language: Option<&'a str>,
    /// Caller's cap on output tokens.
    pub reserved_output_tokens: u32,
}

/// Renders the numbered sources block. `headers_only` drops excerpt
/// bodies, which is the first prompt-shrinking fallback.
#[must_use]
pub fn sources_block(excerpts: &[SourceExcerpt], headers_only: bool) -> String {
    let mut block = String::new();
    for excerpt in excerpts {
        block.push_str(&format!("[{}] {}\nURL: {}\n", excerpt.index, excerpt.title, excerpt.url));
        if !headers_only && !excerpt.excerpt.is_empty() {
            block.push_str("Excerpt:\n");
            block.push_str(&excerpt.excerpt);
            block.push('\n');
        }
        block.push('\n');
    }
    block
}

/// Builds the user message: required skeleton, brief fields, language
/// hint, and the sources block.
#[must_use]
pub fn build_user_prompt(request: &SynthesisRequest<'_>, headers_only: bool) -> String {
    let mut prompt = String::new();
    let brief = request.brief;

    prompt.push_str(&format!("Write a research report on: {}\n\n", brief.topic_or_default()));

    if let Some(audience) = &brief.audience {
        prompt.push_str(&format!("Audience: {audience}\n"));
    }
    if let Some(tone) = &brief.tone {
        prompt.push_str(&format!("Tone: {tone}\n"));
    }
    if brief.target_length_words > 0 {
        prompt.push_str(&format!("Target length: about {} words\n", brief.target_length_words));
    }
    if let Some(language) = request.language {
        prompt.push_str(&format!("Write the report in language: {language}\n"));
    }
    prompt.push('\n');

    prompt.push_str(
        "Required document structure, in this order:\n\
         1. An H1 title line.\n\
         2. The date on the next non-empty line, ISO format YYYY-MM-DD.\n\
         3. These sections as H2 headings:\n",
    );
    for heading in request.outline {
        prompt.push_str(&format!("   - {heading}\n"));
    }
    prompt.push_str(
        "4. \"References\" as a numbered list: N. <title> \u{2014} <url>, one per source used.\n\
         5. An \"Evidence check\" appendix section summarizing how well the claims are covered.\n\n\
         Cite sources inline with bracketed numeric indices like [1] that refer to the numbered \
         sources below. Output Markdown only.\n\n",
    );

    if let Some(hint) = request.template.user_hint {
        prompt.push_str(hint);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Sources:\n\n");
    prompt.push_str(&sources_block(request.excerpts, headers_only));
    prompt
}

/// Computes the output allowance for a prompt: whatever the context
/// leaves after the prompt and headroom, floored at
/// [`MIN_OUTPUT_TOKENS`] and capped by the caller's reservation.
#[must_use]
pub fn output_allowance(model: &str, system: &str, user: &str, reserved_output: u32) -> u32 {
    let context = model_context(model);
    let prompt_tokens = estimate_tokens(system) + estimate_tokens(user);
    let free = context.saturating_sub(headroom(model)).saturating_sub(prompt_tokens);
    let free = u32::try_from(free).unwrap_or(u32::MAX);
    free.max(MIN_OUTPUT_TOKENS).min(reserved_output.max(MIN_OUTPUT_TOKENS))
}

/// Synthesizes the report Markdown.
///
/// # Errors
///
/// Returns [`PipelineError::NoSubstantiveBody`] when the model produced
/// no usable text after the retry and both prompt-shrinking fallbacks,
/// or on a cache-only miss.
pub async fn synthesize(
    provider: &dyn ChatProvider,
    cache: Option<&Cache>,
    cache_only: bool,
    request: &SynthesisRequest<'_>,
) -> Result<String, Error> {
    let system = request.template.system_prompt;

    // Primary attempt: full prompt, one retry on transient failure.
    let user = build_user_prompt(request, false);
    match call(provider, cache, cache_only, request, system, &user, true).await {
        Ok(markdown) => return Ok(markdown),
        Err(e) if e.is_invalid_request() => {
            warn!(error = %e, "synthesis rejected; retrying with headers-only sources");
        }
        Err(LlmError::CacheOnlyMiss) => {
            return Err(PipelineError::NoSubstantiveBody.into());
        }
        Err(e) => {
            warn!(error = %e, "synthesis failed");
            return Err(PipelineError::NoSubstantiveBody.into());
        }
    }

    // Fallback 1: strip excerpt bodies, headers only.
    let user = build_user_prompt(request, true);
    match call(provider, cache, cache_only, request, system, &user, false).await {
        Ok(markdown) => return Ok(markdown),
        Err(e) if e.is_invalid_request() => {
            warn!(error = %e, "headers-only synthesis rejected; merging system into user");
        }
        Err(e) => {
            warn!(error = %e, "headers-only synthesis failed");
            return Err(PipelineError::NoSubstantiveBody.into());
        }
    }

    // Fallback 2: no system role; prepend it to the user message.
    let merged = format!("{system}\n\n{user}");
    match call(provider, cache, cache_only, request, "", &merged, false).await {
        Ok(markdown) => Ok(markdown),
        Err(e) => {
            warn!(error = %e, "merged-prompt synthesis failed");
            Err(PipelineError::NoSubstantiveBody.into())
        }
    }
}

/// One synthesis call, optionally retrying once on transient failure.
async fn call(
    provider: &dyn ChatProvider,
    cache: Option<&Cache>,
    cache_only: bool,
    request: &SynthesisRequest<'_>,
    system: &str,
    user: &str,
    retry_transient: bool,
) -> Result<String, LlmError> {
    let max_tokens = output_allowance(request.model, system, user, request.reserved_output_tokens);

    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(system_message(system));
    }
    messages.push(user_message(user));

    let chat_request = ChatRequest {
        model: request.model.to_string(),
        messages,
        temperature: Some(0.1),
        max_tokens: Some(max_tokens),
        n: Some(1),
    };

    let result = chat_cached(provider, cache, cache_only, &chat_request).await;
    let response = match result {
        Err(e) if retry_transient && e.is_transient() => {
            tokio::time::sleep(RETRY_DELAY).await;
            chat_cached(provider, cache, cache_only, &chat_request).await?
        }
        other => other?,
    };

    let markdown = response.0.content.trim().to_string();
    if markdown.is_empty() {
        return Err(LlmError::NoChoices);
    }
    Ok(markdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ReportType, template_for};
    use crate::llm::testing::ScriptedProvider;

    fn outline() -> Vec<String> {
        template_for(ReportType::Default)
            .outline
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn excerpts() -> Vec<SourceExcerpt> {
        vec![
            SourceExcerpt::new(1, "Alpha", "https://a.example/alpha", "alpha body text"),
            SourceExcerpt::new(2, "Beta", "https://b.example/beta", "beta body text"),
        ]
    }

    fn request<'a>(
        brief: &'a Brief,
        outline: &'a [String],
        excerpts: &'a [SourceExcerpt],
    ) -> SynthesisRequest<'a> {
        SynthesisRequest {
            model: "test-model",
            brief,
            template: template_for(ReportType::Default),
            outline,
            excerpts,
            language: None,
            reserved_output_tokens: 2_048,
        }
    }

    #[test]
    fn test_sources_block_numbers_and_urls() {
        let block = sources_block(&excerpts(), false);
        assert!(block.contains("[1] Alpha"));
        assert!(block.contains("URL: https://a.example/alpha"));
        assert!(block.contains("[2] Beta"));
        assert!(block.contains("alpha body text"));
    }

    #[test]
    fn test_sources_block_headers_only() {
        let block = sources_block(&excerpts(), true);
        assert!(block.contains("[1] Alpha"));
        assert!(!block.contains("alpha body text"));
        assert!(!block.contains("Excerpt:"));
    }

    #[test]
    fn test_user_prompt_carries_skeleton_and_brief() {
        let brief = Brief {
            topic: "test topic".to_string(),
            audience: Some("devs".to_string()),
            ..Brief::default()
        };
        let outline = outline();
        let sources = excerpts();
        let prompt = build_user_prompt(&request(&brief, &outline, &sources), false);
        assert!(prompt.contains("test topic"));
        assert!(prompt.contains("Audience: devs"));
        assert!(prompt.contains("Alternatives & conflicting evidence"));
        assert!(prompt.contains("YYYY-MM-DD"));
        assert!(prompt.contains("Evidence check"));
    }

    #[test]
    fn test_output_allowance_clamps() {
        // Tiny reservation still yields the floor.
        assert_eq!(output_allowance("test-model", "s", "u", 1), MIN_OUTPUT_TOKENS);
        // Large prompt against a small context floors at the minimum.
        let huge = "x".repeat(64_000);
        assert_eq!(output_allowance("gpt-4", &huge, &huge, 4_096), MIN_OUTPUT_TOKENS);
        // Roomy context is capped by the reservation.
        assert_eq!(output_allowance("gpt-4o", "s", "u", 2_048), 2_048);
    }

    #[tokio::test]
    async fn test_synthesize_happy_path() {
        let provider = ScriptedProvider::always("# Report\n\n2026-01-01\n\nBody [1].");
        let brief = Brief::default();
        let outline = outline();
        let sources = excerpts();
        let markdown = synthesize(&provider, None, false, &request(&brief, &outline, &sources))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(markdown.starts_with("# Report"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_walks_fallback_chain() {
        let invalid = || LlmError::Api {
            message: "context length exceeded".to_string(),
            error_type: Some("invalid_request_error".to_string()),
        };
        let provider = ScriptedProvider::new(vec![
            Err(invalid()),
            Err(invalid()),
            Ok("# Recovered".to_string()),
        ]);
        let brief = Brief::default();
        let outline = outline();
        let sources = excerpts();
        let markdown = synthesize(&provider, None, false, &request(&brief, &outline, &sources))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(markdown, "# Recovered");
        assert_eq!(provider.call_count(), 3);
        // The final call merged the system prompt into the user message.
        let calls = provider.calls.lock().unwrap_or_else(|_| unreachable!());
        assert!(calls[2].contains("Use ONLY the provided sources"));
    }

    #[tokio::test]
    async fn test_empty_body_is_sentinel() {
        let provider = ScriptedProvider::always("   ");
        let brief = Brief::default();
        let outline = outline();
        let sources = excerpts();
        let result = synthesize(&provider, None, false, &request(&brief, &outline, &sources)).await;
        assert!(matches!(
            result,
            Err(Error::Pipeline(PipelineError::NoSubstantiveBody))
        ));
    }

    #[tokio::test]
    async fn test_transient_failure_retries_once() {
        let provider = ScriptedProvider::new(vec![
            Err(LlmError::Transport("connection reset".to_string())),
            Ok("# After retry".to_string()),
        ]);
        let brief = Brief::default();
        let outline = outline();
        let sources = excerpts();
        let markdown = synthesize(&provider, None, false, &request(&brief, &outline, &sources))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(markdown, "# After retry");
        assert_eq!(provider.call_count(), 2);
    }
}
