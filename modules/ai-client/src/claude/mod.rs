mod client;
pub(crate) mod types;

use std::time::Duration;

use crate::error::{AiError, Result};
use client::ClaudeClient;
use types::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_MAX_TOKENS: u32 = 1000;

// =============================================================================
// Claude Agent
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> Result<ClaudeClient> {
        let client = ClaudeClient::new(&self.api_key, self.timeout)?;
        Ok(match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        })
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest::new(&self.model)
            .message(WireMessage::user(prompt))
            .max_tokens(DEFAULT_MAX_TOKENS)
            .temperature(0.0)
    }

    /// Single-turn user prompt. Returns the first text block, trimmed.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let request = self.request(prompt);
        let response = self.client()?.chat(&request).await?;
        response.text().ok_or(AiError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claude_new() {
        let ai = Claude::new("sk-ant-test", "claude-3-5-haiku-latest");
        assert_eq!(ai.model(), "claude-3-5-haiku-latest");
        assert_eq!(ai.api_key, "sk-ant-test");
    }

    #[test]
    fn complete_sends_one_user_turn_without_system_prompt() {
        let ai = Claude::new("sk-ant-test", "claude-3-5-haiku-latest");
        let json = serde_json::to_value(ai.request("describe this")).unwrap();
        assert_eq!(json["model"], "claude-3-5-haiku-latest");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["messages"][0]["content"][0]["text"], "describe this");
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_claude_with_base_url() {
        let ai = Claude::new("sk-ant-test", "claude-3-5-haiku-latest")
            .with_base_url("https://custom.api.com");
        assert_eq!(ai.base_url, Some("https://custom.api.com".to_string()));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let ai = Claude::new("sk-ant-test", "m")
            .with_base_url("http://127.0.0.1:1")
            .with_timeout(Duration::from_secs(2));
        let err = ai.complete("hi").await.unwrap_err();
        assert!(matches!(err, AiError::Network(_)), "got {err:?}");
    }
}
