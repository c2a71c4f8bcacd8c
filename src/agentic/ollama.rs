//! Ollama client
//!
//! LLM client implementation for an Ollama-compatible chat endpoint. Calls
//! are made at temperature zero so repeated runs of the same question
//! produce the same SQL.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::llm_client::LlmClient;

/// Default model when `LLM_MODEL` is unset
const DEFAULT_MODEL: &str = "mistral";

/// Default endpoint when `OLLAMA_URL` is unset
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama chat API client
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client for the given endpoint and model
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from `OLLAMA_URL` / `LLM_MODEL` environment variables
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(base_url, model)
    }

    async fn call_api(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        force_json: bool,
    ) -> Result<String> {
        let mut body = serde_json::json!({
            "model": &self.model,
            "stream": false,
            "options": {"temperature": 0},
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ]
        });
        if force_json {
            body["format"] = serde_json::json!("json");
        }

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error {}: {}", status, text));
        }

        #[derive(Deserialize)]
        struct ChatMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            message: Option<ChatMessage>,
        }

        let chat: ChatResponse = response.json().await?;
        chat.message
            .map(|m| m.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow!("Empty response from Ollama"))
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call_api(system_prompt, user_prompt, false).await
    }

    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call_api(system_prompt, user_prompt, true).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client() {
        let client = OllamaClient::new("http://ollama:11434", "mistral");
        assert_eq!(client.model_name(), "mistral");
        assert_eq!(client.provider_name(), "Ollama");
    }

    #[test]
    fn test_trailing_slash_is_tolerated() {
        let client = OllamaClient::new("http://ollama:11434/", "mistral");
        assert_eq!(client.base_url.trim_end_matches('/'), "http://ollama:11434");
    }
}
