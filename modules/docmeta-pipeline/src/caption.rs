use std::sync::Arc;
use std::time::Duration;

use ai_client::{flatten_newlines, truncate_chars, Claude};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docmeta_common::{CaptionConfig, PipelineConfig, CAPTION_PLACEHOLDER};

/// Produces a short label for a document's text.
#[async_trait]
pub trait CaptionBackend: Send + Sync {
    async fn generate_caption(&self, text: &str) -> Result<String>;

    fn name(&self) -> &str;
}

// =============================================================================
// CaptionGenerator
// =============================================================================

/// Wraps a [`CaptionBackend`] with input/output caps. Never fails: backend
/// errors and blank answers come back as an empty string.
pub struct CaptionGenerator {
    backend: Arc<dyn CaptionBackend>,
    max_input_chars: usize,
    max_caption_chars: usize,
}

impl CaptionGenerator {
    pub fn new(backend: Arc<dyn CaptionBackend>, max_input_chars: usize, max_caption_chars: usize) -> Self {
        Self {
            backend,
            max_input_chars,
            max_caption_chars,
        }
    }

    pub fn from_config(backend: Arc<dyn CaptionBackend>, config: &PipelineConfig) -> Self {
        Self::new(backend, config.max_input_chars, config.max_caption_chars)
    }

    pub async fn caption(&self, text: &str) -> String {
        let input = truncate_chars(text, self.max_input_chars);
        if input.len() < text.len() {
            debug!(
                from = text.chars().count(),
                to = self.max_input_chars,
                "Truncated caption input"
            );
        }

        match self.backend.generate_caption(input).await {
            Ok(raw) => {
                let caption = truncate_chars(raw.trim(), self.max_caption_chars).trim_end();
                if caption.is_empty() {
                    warn!(backend = self.backend.name(), "Caption backend returned nothing");
                }
                caption.to_string()
            }
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Caption generation failed");
                String::new()
            }
        }
    }
}

// =============================================================================
// Claude
// =============================================================================

/// Fills the prompt template and asks Claude for a caption.
pub struct ClaudeCaptioner {
    claude: Claude,
    template: String,
}

impl ClaudeCaptioner {
    pub fn new(claude: Claude, template: impl Into<String>) -> Self {
        Self {
            claude,
            template: template.into(),
        }
    }

    pub fn from_config(config: &CaptionConfig) -> Result<Self> {
        let api_key = config
            .anthropic_api_key
            .clone()
            .context("ANTHROPIC_API_KEY is not set")?;
        let claude = Claude::new(api_key, &config.model).with_timeout(config.request_timeout);
        Ok(Self::new(claude, &config.prompt_template))
    }

    /// Prompt text sent for `text`, on a single line.
    pub fn prompt_for(&self, text: &str) -> String {
        flatten_newlines(&self.template.replace(CAPTION_PLACEHOLDER, text))
    }
}

#[async_trait]
impl CaptionBackend for ClaudeCaptioner {
    async fn generate_caption(&self, text: &str) -> Result<String> {
        let prompt = self.prompt_for(text);
        let caption = self.claude.complete(&prompt).await?;
        Ok(caption)
    }

    fn name(&self) -> &str {
        "claude"
    }
}

// =============================================================================
// Gateway
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayRequest<'a> {
    action: &'static str,
    input_text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    success: bool,
    payload: Option<GatewayPayload>,
}

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    result: Option<String>,
}

/// HTTP endpoint that fronts a model with an `analyzeText` action.
pub struct GatewayCaptioner {
    http: reqwest::Client,
    url: String,
}

impl GatewayCaptioner {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build gateway HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn from_config(config: &CaptionConfig) -> Result<Self> {
        let url = config
            .gateway_url
            .clone()
            .context("CAPTION_GATEWAY_URL is not set")?;
        Self::new(url, config.request_timeout)
    }
}

#[async_trait]
impl CaptionBackend for GatewayCaptioner {
    async fn generate_caption(&self, text: &str) -> Result<String> {
        let body = GatewayRequest {
            action: "analyzeText",
            input_text: text,
        };
        let resp: GatewayResponse = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("Gateway request failed")?
            .error_for_status()
            .context("Gateway returned an error status")?
            .json()
            .await
            .context("Gateway response was not valid JSON")?;

        if !resp.success {
            bail!("Gateway reported failure");
        }
        Ok(resp.payload.and_then(|p| p.result).unwrap_or_default())
    }

    fn name(&self) -> &str {
        "gateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCaptioner;

    #[tokio::test]
    async fn input_and_output_are_truncated() {
        let backend = Arc::new(MockCaptioner::new().default_caption(&"x".repeat(80)));
        let generator = CaptionGenerator::new(backend.clone(), 10, 50);

        let caption = generator.caption(&"a".repeat(100)).await;

        assert_eq!(caption.chars().count(), 50);
        assert_eq!(backend.inputs(), vec!["a".repeat(10)]);
    }

    #[tokio::test]
    async fn truncation_respects_multibyte_characters() {
        let backend = Arc::new(MockCaptioner::new().default_caption("חשבונית מס קבלה"));
        let generator = CaptionGenerator::new(backend, 8000, 7);
        assert_eq!(generator.caption("text").await, "חשבונית");
    }

    #[tokio::test]
    async fn backend_errors_become_empty() {
        let backend = Arc::new(MockCaptioner::new().failing("timeout"));
        let generator = CaptionGenerator::new(backend.clone(), 8000, 50);
        assert_eq!(generator.caption("Invoice #123").await, "");
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn claude_prompt_substitutes_and_flattens() {
        let captioner = ClaudeCaptioner::new(
            Claude::new("key", "model"),
            "Label this:\n@FILE_CONTENT@\nThanks",
        );
        assert_eq!(
            captioner.prompt_for("line one\nline two"),
            "Label this: line one line two Thanks"
        );
    }

    #[test]
    fn gateway_payloads_match_wire_format() {
        let req = serde_json::to_value(GatewayRequest {
            action: "analyzeText",
            input_text: "hello",
        })
        .unwrap();
        assert_eq!(req, serde_json::json!({"action": "analyzeText", "inputText": "hello"}));

        let resp: GatewayResponse =
            serde_json::from_str(r#"{"success":true,"payload":{"result":"Invoice"}}"#).unwrap();
        assert!(resp.success);
        assert_eq!(resp.payload.unwrap().result.as_deref(), Some("Invoice"));
    }
}
