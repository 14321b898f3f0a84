//! # LLM provider (chat-completions transport)
//!
//! A thin contract over a chat endpoint plus the one JSON-extraction utility
//! every structured call shares.
//!
//! - [`LlmProvider`] is the async trait the pipeline depends on: one
//!   `chat(system_prompt, user_prompt) -> String` method. Model, temperature,
//!   and token cap are fixed per provider instance.
//! - [`OpenAiChat`] implements it over an **OpenAI-compatible** endpoint via
//!   `async_openai`, retrying a failed request up to
//!   [`MAX_ATTEMPTS`] times with no backoff before surfacing
//!   [`MemoryError::Llm`].
//! - [`extract_json`] pulls the first fenced ```json block out of free-form
//!   model output (or parses the whole text when no fence is present) and
//!   returns `None` instead of failing, so callers can treat garbage as
//!   "nothing extracted".

use std::time::Duration;

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::MemoryError;

/// Bounded retry budget for LLM and embedding requests.
pub const MAX_ATTEMPTS: usize = 5;

/// Async chat contract the extraction and summarization layers depend on.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one system + user prompt pair and return the completion text.
    ///
    /// Implementations retry transient failures themselves (bounded, no
    /// backoff) and only error after the budget is exhausted.
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, MemoryError>;
}

/// OpenAI-compatible chat provider.
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAiChat {
    /// Build a client against `api_base` with `api_key`.
    pub fn new(
        api_base: &str,
        api_key: &str,
        model: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key.to_string())
            .with_api_base(api_base.to_string());
        // No internal backoff: retries are handled by this module's own
        // bounded, no-backoff loop (see `chat` below).
        let no_retry_backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();
        Self {
            client: Client::with_config(openai_config).with_backoff(no_retry_backoff),
            model: model.to_string(),
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiChat {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, MemoryError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(system_prompt.to_string()),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(user_prompt.to_string()),
                name: None,
            }),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone()).messages(messages);
        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            args.max_tokens(max_tokens);
        }
        let request = args
            .build()
            .map_err(|e| MemoryError::Llm(e.to_string()))?;

        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let mut text = String::new();
                    for choice in &response.choices {
                        if let Some(content) = &choice.message.content {
                            text.push_str(content);
                        }
                    }
                    debug!(attempt, chars = text.len(), "chat completion received");
                    return Ok(text.trim().to_string());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "chat completion failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(MemoryError::Llm(last_error))
    }
}

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json[\s\r\n]*(.*?)```").expect("valid fence regex"));

/// Extract the first JSON value embedded in free-form model output.
///
/// Behavior mirrors what the structured prompts promise:
/// - No code fence: the whole text must parse as JSON.
/// - Otherwise: the first ```json fenced block is parsed.
/// - Anything unparseable yields `None`; this function never errors.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    if !text.contains("```") {
        return serde_json::from_str(text).ok();
    }
    let captured = JSON_FENCE.captures(text)?;
    serde_json::from_str(captured.get(1)?.as_str()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_extract_json_bare() {
        let value = extract_json(r#"{"key": "value"}"#).unwrap();
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn test_extract_json_fenced_with_noise() {
        let text = "some preamble\n```json\n{\n  \"key\": \"value\"\n}\n```\ntrailing chatter";
        let value = extract_json(text).unwrap();
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn test_extract_json_case_insensitive_fence() {
        let text = "```JSON\n{\"n\": 1}\n```";
        assert_eq!(extract_json(text).unwrap()["n"], 1);
    }

    #[test]
    fn test_extract_json_garbage_is_none() {
        assert!(extract_json("not json at all").is_none());
        assert!(extract_json("```json\nnope\n```").is_none());
        assert!(extract_json("```python\nprint(1)\n```").is_none());
    }

    #[tokio::test]
    async fn test_openai_chat_happy_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(serde_json::json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion",
                    "created": 0,
                    "model": "test-model",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "  hello  "},
                        "finish_reason": "stop"
                    }]
                }));
            })
            .await;

        let provider = OpenAiChat::new(
            &format!("{}/v1", server.base_url()),
            "test-key",
            "test-model",
            Some(0.0),
            Some(64),
        );
        let text = provider.chat("system", "user").await.unwrap();
        assert_eq!(text, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_chat_retries_then_fails() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let provider = OpenAiChat::new(
            &format!("{}/v1", server.base_url()),
            "test-key",
            "test-model",
            None,
            None,
        );
        let err = provider.chat("system", "user").await.unwrap_err();
        assert!(matches!(err, MemoryError::Llm(_)));
        assert_eq!(mock.hits_async().await, MAX_ATTEMPTS);
    }
}
