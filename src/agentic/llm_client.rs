//! LLM client trait
//!
//! Unified interface over model providers. The agent only needs a
//! system/user chat call that is expected to come back as JSON text; the
//! response is always treated as untrusted and parsed defensively upstream.

use anyhow::Result;
use async_trait::async_trait;

/// Chat interface to a language model endpoint.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Call the model with system + user prompts, return raw text response.
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Call the model expecting a JSON response. Providers with a native
    /// JSON mode enable it; others fall back to prompt instructions.
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Model name for logging.
    fn model_name(&self) -> &str;

    /// Provider name for logging.
    fn provider_name(&self) -> &str;
}
