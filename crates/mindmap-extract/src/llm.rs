//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use mindmap_core::{LlmConfig, MindmapError};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// A message in a chat conversation with the model.
///
/// # Examples
///
/// ```
/// use mindmap_extract::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("What is a knowledge graph?");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// A system instruction message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use mindmap_extract::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// A chat model that answers one conversation with one text reply.
///
/// Implementations make exactly one request per call and never retry.
/// Transport, auth and response-shape failures are [`MindmapError::Model`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `messages` and return the assistant's text.
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, MindmapError>;

    /// Model identifier, for logs and diagnostics.
    fn model(&self) -> &str;
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use mindmap_core::LlmConfig;
/// use mindmap_extract::llm::{ChatModel, LlmClient};
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Create a new client from configuration.
    ///
    /// The API key is optional so keyless local providers work.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Model`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, MindmapError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MindmapError::Model(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        if self.config.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    /// Send a chat completion request and return the text response.
    ///
    /// Posts to `{base_url}/v1/chat/completions` with the configured
    /// temperature and output cap. `response_format` is only sent when
    /// `json_mode` is enabled, since not every provider accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Model`] on HTTP errors or response parsing failures.
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, MindmapError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        let url = format!("{base_url}/v1/chat/completions");

        let body = self.request_body(&messages);

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        request = request.header("Content-Type", "application/json");

        debug!(model = %self.config.model, messages = messages.len(), "sending chat completion");
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| MindmapError::Model(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(MindmapError::Model(format!(
                "model API error {status}: {body_text}"
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MindmapError::Model(format!("failed to parse response: {e}")))?;

        let content = response_body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                MindmapError::Model(format!("unexpected response structure: {response_body}"))
            })?;

        Ok(content.to_string())
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn client(server: &MockServer, json_mode: bool) -> LlmClient {
        LlmClient::new(&LlmConfig {
            api_key: Some("sk-test".into()),
            base_url: Some(server.base_url()),
            json_mode,
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn model_returns_config_model() {
        let config = LlmConfig {
            model: "gpt-4o-mini".into(),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn chat_message_serializes() {
        let json = serde_json::to_value(ChatMessage::system("hello")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn response_format_only_in_json_mode() {
        let mut config = LlmConfig::default();
        let plain = LlmClient::new(&config).unwrap().request_body(&[]);
        assert!(plain.get("response_format").is_none());
        assert_eq!(plain["max_tokens"], 2000);

        config.json_mode = true;
        let json = LlmClient::new(&config).unwrap().request_body(&[]);
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[tokio::test]
    async fn chat_sends_generation_parameters() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test")
                .body_includes(r#""model":"gpt-4o""#)
                .body_includes(r#""max_tokens":2000"#);
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"nodes\":[],\"edges\":[]}" } }]
            }));
        });

        let reply = client(&server, false)
            .chat(vec![ChatMessage::system("sys"), ChatMessage::user("q")])
            .await
            .unwrap();

        assert_eq!(reply, r#"{"nodes":[],"edges":[]}"#);
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn http_error_is_model_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(429).body("rate limited");
        });

        let err = client(&server, true)
            .chat(vec![ChatMessage::user("q")])
            .await
            .unwrap_err();

        assert!(matches!(err, MindmapError::Model(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn missing_choices_is_model_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({ "choices": [] }));
        });

        let err = client(&server, false)
            .chat(vec![ChatMessage::user("q")])
            .await
            .unwrap_err();

        assert!(matches!(err, MindmapError::Model(_)));
    }
}
