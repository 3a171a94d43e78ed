//! OpenAI-compatible chat adapter using the `async-openai` crate.
//!
//! Works against any server that speaks the chat-completions wire contract
//! (`POST /v1/chat/completions`), including local inference servers, via
//! the base URL override.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse, Role};
use super::provider::ChatProvider;
use crate::error::LlmError;

/// OpenAI-compatible chat-completions client.
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
}

impl OpenAiChat {
    /// Creates an adapter for the given endpoint.
    ///
    /// `base_url` of `None` uses the upstream default; local servers pass
    /// e.g. `http://localhost:8080/v1`.
    #[must_use]
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base.trim_end_matches('/'));
        }
        Self {
            client: Client::with_config(config),
        }
    }

    /// Converts our message type to the SDK type. Assistant messages never
    /// occur in requests here; they map to user messages defensively.
    fn convert_message(role: Role, content: &str) -> ChatCompletionRequestMessage {
        match role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(content.to_string()),
                    name: None,
                })
            }
            Role::User | Role::Assistant => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(content.to_string()),
                    name: None,
                })
            }
        }
    }

    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| Self::convert_message(m.role, &m.content))
            .collect();

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            n: request.n,
            ..Default::default()
        }
    }

    fn map_error(err: &OpenAIError) -> LlmError {
        match err {
            OpenAIError::ApiError(api) => LlmError::Api {
                message: api.message.clone(),
                error_type: api.r#type.clone(),
            },
            OpenAIError::Reqwest(e) => LlmError::Transport(e.to_string()),
            other => LlmError::Transport(other.to_string()),
        }
    }
}

impl std::fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChat")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let sdk_request = Self::build_request(request);

        let response = self
            .client
            .chat()
            .create(sdk_request)
            .await
            .map_err(|e| Self::map_error(&e))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::NoChoices);
        }

        Ok(ChatResponse { content })
    }

    async fn preflight(&self) -> Result<(), LlmError> {
        self.client
            .models()
            .list()
            .await
            .map(|_| ())
            .map_err(|e| Self::map_error(&e))
    }
}
