//! LLM chat-completion transport.
//!
//! This is the low-level layer a [`crate::provider::ProviderClient`] sits
//! on top of: plain chat messages in, a completion out. No tool-calling —
//! the gateway never authors or executes tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (instructions).
    System,
    /// User message.
    User,
    /// Assistant message.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender.
    pub role: Role,
    /// The content of the message.
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// LLM completion response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The response content.
    pub content: String,
    /// Finish reason, if the upstream API reports one.
    pub finish_reason: Option<String>,
    /// Usage statistics.
    pub usage: Option<Usage>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    pub prompt_tokens: u32,
    /// Completion tokens.
    pub completion_tokens: u32,
    /// Total tokens.
    pub total_tokens: u32,
}

/// LLM configuration for a single upstream call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name (e.g., "gpt-4o-mini", "claude-3-haiku").
    pub model: String,
    /// API key (optional, can use env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL (optional, for custom / OpenAI-compatible endpoints).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Temperature (0.0 - 2.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Max tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl LlmConfig {
    /// Create a new LLM config with the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), ..Default::default() }
    }

    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the temperature.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    /// Set max tokens.
    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

/// Trait for LLM chat-completion transports.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse>;

    /// Get the model name.
    fn model(&self) -> &str;
}

/// OpenAI-compatible chat-completion transport.
pub struct OpenAiProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(config: LlmConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    /// Create with default config.
    pub fn default_model() -> Self {
        Self::new(LlmConfig::default())
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse> {
        let api_key = self
            .config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| crate::error::Error::provider("OPENAI_API_KEY not set"))?;

        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });

        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(crate::error::Error::provider(format!("API error: {}", error_text)));
        }

        let data: serde_json::Value = response.json().await?;

        let choice = data["choices"]
            .get(0)
            .ok_or_else(|| crate::error::Error::provider("no choices in response"))?;

        let message = &choice["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();

        let usage = data["usage"].as_object().map(|u| Usage {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: u["total_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(LlmResponse {
            content,
            finish_reason: choice["finish_reason"].as_str().map(|s| s.to_string()),
            usage,
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Mock chat-completion transport for tests (no network calls).
pub struct MockLlmProvider {
    model: String,
    responses: std::sync::Mutex<Vec<String>>,
}

impl MockLlmProvider {
    /// Create a new mock provider.
    pub fn new() -> Self {
        Self { model: "mock-model".to_string(), responses: std::sync::Mutex::new(vec![]) }
    }

    /// Queue a response to return (FIFO).
    pub fn add_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().insert(0, response.into());
    }

    /// Create with a single response.
    pub fn with_response(response: impl Into<String>) -> Self {
        let provider = Self::new();
        provider.add_response(response);
        provider
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn chat(&self, _messages: &[Message]) -> Result<LlmResponse> {
        let content = self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| "Mock response".to_string());

        Ok(LlmResponse {
            content,
            finish_reason: Some("stop".to_string()),
            usage: Some(Usage { prompt_tokens: 10, completion_tokens: 20, total_tokens: 30 }),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_llm_config() {
        let config = LlmConfig::new("gpt-4").temperature(0.5).max_tokens(1000);
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.max_tokens, Some(1000));
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let provider = MockLlmProvider::with_response("Hello from mock!");
        let response = provider.chat(&[Message::user("Hi")]).await.unwrap();
        assert_eq!(response.content, "Hello from mock!");
    }

    #[tokio::test]
    async fn test_mock_provider_fifo() {
        let provider = MockLlmProvider::new();
        provider.add_response("first");
        provider.add_response("second");
        let r1 = provider.chat(&[Message::user("hi")]).await.unwrap();
        let r2 = provider.chat(&[Message::user("hi")]).await.unwrap();
        assert_eq!(r1.content, "first");
        assert_eq!(r2.content, "second");
    }
}
