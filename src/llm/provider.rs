//! Chat provider trait.
//!
//! The single seam between the pipeline and any chat-completions backend.
//! Production uses the OpenAI-compatible adapter; tests inject stubs.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::LlmError;

/// A chat-completions backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logging and the reproducibility footer.
    fn name(&self) -> &'static str;

    /// Executes one chat completion.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport failures, API rejections, or
    /// empty responses. Implementations must distinguish transient
    /// transport errors from permanent API rejections so callers can
    /// apply the right recovery.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Cheap reachability probe (`GET /v1/models` for OpenAI-compatible
    /// servers). Failures are advisory; the pipeline logs a warning and
    /// continues.
    async fn preflight(&self) -> Result<(), LlmError> {
        Ok(())
    }
}
