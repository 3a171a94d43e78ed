//! LLM adapter: provider-agnostic chat types, the OpenAI-compatible
//! client, and the cached-call wrapper shared by the planner, synthesizer,
//! and verifier.

pub mod message;
pub mod openai;
pub mod provider;

pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, system_message, user_message};
pub use openai::OpenAiChat;
pub use provider::ChatProvider;

use tracing::debug;

use crate::cache::{Bucket, Cache};
use crate::error::LlmError;

/// Executes a chat request through the LLM cache.
///
/// The cache key covers the model and the full system and user text, so
/// identical calls across runs reuse prior completions. In cache-only mode
/// a miss fails fast with [`LlmError::CacheOnlyMiss`] instead of calling
/// the provider.
///
/// Returns the response and whether it came from the cache.
pub async fn chat_cached(
    provider: &dyn ChatProvider,
    cache: Option<&Cache>,
    cache_only: bool,
    request: &ChatRequest,
) -> Result<(ChatResponse, bool), LlmError> {
    let key = Cache::llm_key(&request.model, &request.system_text(), &request.user_text());

    if let Some(cache) = cache
        && let Some(hit) = cache.get_json::<ChatResponse>(Bucket::Llm, &key)?
    {
        debug!(key = %key, "llm cache hit");
        return Ok((hit, true));
    }

    if cache_only {
        return Err(LlmError::CacheOnlyMiss);
    }

    let response = provider.chat(request).await?;

    if let Some(cache) = cache {
        cache.put_json(Bucket::Llm, &key, &response)?;
    }

    Ok((response, false))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stub providers shared by unit tests.

    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::message::{ChatRequest, ChatResponse};
    use super::provider::ChatProvider;
    use crate::error::LlmError;

    /// Returns canned responses in order; repeats the last one when
    /// exhausted. Records every request's user text.
    pub struct ScriptedProvider {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn always(content: &str) -> Self {
            Self::new(vec![Ok(content.to_string())])
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().map(|c| c.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(request.user_text());
            }
            let next = self.responses.lock().ok().and_then(|mut r| {
                if r.len() > 1 {
                    r.pop()
                } else {
                    r.last().map(clone_result)
                }
            });
            match next {
                Some(Ok(content)) => Ok(ChatResponse { content }),
                Some(Err(err)) => Err(err),
                None => Err(LlmError::NoChoices),
            }
        }
    }

    fn clone_result(r: &Result<String, LlmError>) -> Result<String, LlmError> {
        match r {
            Ok(s) => Ok(s.clone()),
            Err(LlmError::CacheOnlyMiss) => Err(LlmError::CacheOnlyMiss),
            Err(LlmError::NoChoices) => Err(LlmError::NoChoices),
            Err(LlmError::Transport(m)) => Err(LlmError::Transport(m.clone())),
            Err(LlmError::Parse(m)) => Err(LlmError::Parse(m.clone())),
            Err(LlmError::Api {
                message,
                error_type,
            }) => Err(LlmError::Api {
                message: message.clone(),
                error_type: error_type.clone(),
            }),
            Err(LlmError::Cache(_)) => Err(LlmError::NoChoices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedProvider;
    use super::*;
    use crate::llm::message::{system_message, user_message};
    use tempfile::TempDir;

    fn request(user: &str) -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            messages: vec![system_message("sys"), user_message(user)],
            temperature: Some(0.0),
            max_tokens: Some(64),
            n: Some(1),
        }
    }

    #[tokio::test]
    async fn test_chat_cached_hits_on_second_call() {
        let temp = TempDir::new().unwrap_or_else(|_| unreachable!());
        let cache = Cache::open(temp.path()).unwrap_or_else(|_| unreachable!());
        let provider = ScriptedProvider::always("answer");

        let (first, from_cache) = chat_cached(&provider, Some(&cache), false, &request("q"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(first.content, "answer");
        assert!(!from_cache);

        let (second, from_cache) = chat_cached(&provider, Some(&cache), false, &request("q"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(second.content, "answer");
        assert!(from_cache);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_only_miss_fails_fast() {
        let temp = TempDir::new().unwrap_or_else(|_| unreachable!());
        let cache = Cache::open(temp.path()).unwrap_or_else(|_| unreachable!());
        let provider = ScriptedProvider::always("never called");

        let result = chat_cached(&provider, Some(&cache), true, &request("q")).await;
        assert!(matches!(result, Err(LlmError::CacheOnlyMiss)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_distinct_prompts_do_not_collide() {
        let temp = TempDir::new().unwrap_or_else(|_| unreachable!());
        let cache = Cache::open(temp.path()).unwrap_or_else(|_| unreachable!());
        let provider = ScriptedProvider::new(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
        ]);

        let (a, _) = chat_cached(&provider, Some(&cache), false, &request("one"))
            .await
            .unwrap_or_else(|_| unreachable!());
        let (b, _) = chat_cached(&provider, Some(&cache), false, &request("two"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
    }
}
