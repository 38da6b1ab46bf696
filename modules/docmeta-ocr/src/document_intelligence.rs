//! Hosted OCR through Azure AI Document Intelligence (`prebuilt-read`).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::backend::OcrBackend;
use crate::error::{ExtractError, Result};

const API_VERSION: &str = "2023-07-31";
const MODEL: &str = "prebuilt-read";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLLS: u32 = 120;

pub struct DocumentIntelligence {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct AnalyzeOperation {
    status: String,
    #[serde(rename = "analyzeResult")]
    analyze_result: Option<AnalyzeResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: String,
}

impl DocumentIntelligence {
    pub fn new(endpoint: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Ocr(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            poll_interval: POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{MODEL}:analyze?api-version={API_VERSION}",
            self.endpoint
        )
    }

    async fn submit(&self, image: Bytes) -> Result<String> {
        let resp = self
            .http
            .post(self.analyze_url())
            .header(KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image)
            .send()
            .await
            .map_err(|e| ExtractError::Ocr(format!("analyze request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::Ocr(format!("analyze rejected ({status}): {body}")));
        }

        resp.headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ExtractError::Ocr("analyze response had no operation-location".into()))
    }

    async fn poll(&self, operation_url: &str) -> Result<String> {
        for attempt in 0..MAX_POLLS {
            let op: AnalyzeOperation = self
                .http
                .get(operation_url)
                .header(KEY_HEADER, &self.api_key)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| ExtractError::Ocr(format!("poll failed: {e}")))?
                .json()
                .await
                .map_err(|e| ExtractError::Ocr(format!("poll response unreadable: {e}")))?;

            match op.status.as_str() {
                "succeeded" => {
                    debug!(attempt, "Document analysis succeeded");
                    return Ok(op.analyze_result.map(|r| r.content).unwrap_or_default());
                }
                "failed" => {
                    let detail = op.error.map(|e| e.to_string()).unwrap_or_default();
                    warn!(detail = %detail, "Document analysis failed");
                    return Err(ExtractError::Ocr(format!("analysis failed: {detail}")));
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
        Err(ExtractError::Ocr(format!(
            "analysis did not finish after {MAX_POLLS} polls"
        )))
    }
}

#[async_trait]
impl OcrBackend for DocumentIntelligence {
    /// The read model detects script and language itself, so hints are unused.
    async fn recognize(&self, image: Bytes, _languages: &[String]) -> Result<String> {
        let operation_url = self.submit(image).await?;
        self.poll(&operation_url).await
    }

    fn name(&self) -> &str {
        "document-intelligence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_url_targets_read_model() {
        let di = DocumentIntelligence::new(
            "https://example.cognitiveservices.azure.com/",
            "key",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            di.analyze_url(),
            "https://example.cognitiveservices.azure.com/formrecognizer/documentModels/prebuilt-read:analyze?api-version=2023-07-31"
        );
    }

    #[test]
    fn operation_payload_parses() {
        let op: AnalyzeOperation = serde_json::from_str(
            r#"{"status":"succeeded","analyzeResult":{"content":"Invoice #123","pages":[]}}"#,
        )
        .unwrap();
        assert_eq!(op.status, "succeeded");
        assert_eq!(op.analyze_result.unwrap().content, "Invoice #123");

        let running: AnalyzeOperation = serde_json::from_str(r#"{"status":"running"}"#).unwrap();
        assert!(running.analyze_result.is_none());
    }
}
