use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::error::DocMetaError;

/// Default prompt used when `AI_PROMPT_GETCAPTION` is unset.
/// `@FILE_CONTENT@` is replaced with the extracted document text.
pub const DEFAULT_CAPTION_PROMPT: &str = "You label scanned documents for an archive index. \
Read the document text below and reply with a short descriptive title of at most six words, \
in the document's own language, with no quotes or punctuation at the end. \
Document text: @FILE_CONTENT@";

pub const CAPTION_PLACEHOLDER: &str = "@FILE_CONTENT@";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub ocr: OcrConfig,
    pub caption: CaptionConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory of the filesystem store.
    pub root: PathBuf,
}

/// Limits applied by the archive engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Permit pool size per archive.
    pub max_parallel_tasks: usize,
    /// Archives processed at once. 1 keeps listing order.
    pub max_parallel_archives: usize,
    pub max_input_chars: usize,
    pub max_caption_chars: usize,
    pub overwrite_metadata: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 5,
            max_parallel_archives: 1,
            max_input_chars: 8000,
            max_caption_chars: 50,
            overwrite_metadata: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackendKind {
    Tesseract,
    DocumentIntelligence,
}

impl FromStr for OcrBackendKind {
    type Err = DocMetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(Self::Tesseract),
            "document-intelligence" | "azure" => Ok(Self::DocumentIntelligence),
            other => Err(DocMetaError::Config(format!("unknown OCR_BACKEND {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub backend: OcrBackendKind,
    /// Tesseract-style language list, e.g. `eng+heb`.
    pub languages: Vec<String>,
    pub max_pages: usize,
    pub render_dpi: u32,
    /// Binarization threshold as a percentage of full intensity.
    pub binarize_threshold: u8,
    pub scratch_dir: PathBuf,
    pub tesseract_bin: String,
    pub pdftoppm_bin: String,
    pub azure_endpoint: Option<String>,
    pub azure_api_key: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::Tesseract,
            languages: vec!["eng".to_string(), "heb".to_string()],
            max_pages: 5,
            render_dpi: 300,
            binarize_threshold: 65,
            scratch_dir: std::env::temp_dir(),
            tesseract_bin: "tesseract".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
            azure_endpoint: None,
            azure_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionBackendKind {
    Claude,
    Gateway,
}

impl FromStr for CaptionBackendKind {
    type Err = DocMetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Self::Claude),
            "gateway" => Ok(Self::Gateway),
            other => Err(DocMetaError::Config(format!("unknown CAPTION_BACKEND {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptionConfig {
    pub backend: CaptionBackendKind,
    pub prompt_template: String,
    pub anthropic_api_key: Option<String>,
    pub model: String,
    pub gateway_url: Option<String>,
    pub request_timeout: Duration,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            backend: CaptionBackendKind::Claude,
            prompt_template: DEFAULT_CAPTION_PROMPT.to_string(),
            anthropic_api_key: None,
            model: "claude-3-5-haiku-latest".to_string(),
            gateway_url: None,
            request_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub interval: Duration,
    pub only_new: bool,
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pipeline_defaults = PipelineConfig::default();
        let ocr_defaults = OcrConfig::default();
        let caption_defaults = CaptionConfig::default();

        let pipeline = PipelineConfig {
            max_parallel_tasks: parse_or(&var, "MAX_PARALLEL_TASKS", pipeline_defaults.max_parallel_tasks)?,
            max_parallel_archives: parse_or(&var, "MAX_PARALLEL_ARCHIVES", pipeline_defaults.max_parallel_archives)?,
            max_input_chars: parse_or(&var, "AI_MAX_STRING_LENGTH", pipeline_defaults.max_input_chars)?,
            max_caption_chars: parse_or(&var, "CAPTION_MAX_LENGTH", pipeline_defaults.max_caption_chars)?,
            overwrite_metadata: flag_or(&var, "OVERWRITE_METADATA", pipeline_defaults.overwrite_metadata)?,
        };
        if pipeline.max_parallel_tasks == 0 || pipeline.max_parallel_archives == 0 {
            return Err(DocMetaError::Config(
                "MAX_PARALLEL_TASKS and MAX_PARALLEL_ARCHIVES must be at least 1".into(),
            )
            .into());
        }

        let ocr = OcrConfig {
            backend: parse_or(&var, "OCR_BACKEND", ocr_defaults.backend)?,
            languages: var("OCR_LANGUAGES")
                .map(|s| split_languages(&s))
                .unwrap_or(ocr_defaults.languages),
            max_pages: parse_or(&var, "PDF_OCR_MAX_PAGES", ocr_defaults.max_pages)?,
            render_dpi: parse_or(&var, "RENDER_DPI", ocr_defaults.render_dpi)?,
            binarize_threshold: parse_or(&var, "BINARIZE_THRESHOLD", ocr_defaults.binarize_threshold)?
                .min(100),
            scratch_dir: var("SCRATCH_DIR").map(PathBuf::from).unwrap_or(ocr_defaults.scratch_dir),
            tesseract_bin: var("TESSERACT_BIN").unwrap_or(ocr_defaults.tesseract_bin),
            pdftoppm_bin: var("PDFTOPPM_BIN").unwrap_or(ocr_defaults.pdftoppm_bin),
            azure_endpoint: var("AZURE_ENDPOINT"),
            azure_api_key: var("AZURE_API_KEY"),
        };
        if ocr.backend == OcrBackendKind::DocumentIntelligence
            && (ocr.azure_endpoint.is_none() || ocr.azure_api_key.is_none())
        {
            return Err(DocMetaError::Config(
                "AZURE_ENDPOINT and AZURE_API_KEY are required for the document-intelligence OCR backend".into(),
            )
            .into());
        }

        let caption = CaptionConfig {
            backend: parse_or(&var, "CAPTION_BACKEND", caption_defaults.backend)?,
            prompt_template: var("AI_PROMPT_GETCAPTION").unwrap_or(caption_defaults.prompt_template),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            model: var("CAPTION_MODEL").unwrap_or(caption_defaults.model),
            gateway_url: var("CAPTION_GATEWAY_URL"),
            request_timeout: Duration::from_secs(parse_or(
                &var,
                "CAPTION_TIMEOUT_SECS",
                caption_defaults.request_timeout.as_secs(),
            )?),
        };
        match caption.backend {
            CaptionBackendKind::Claude if caption.anthropic_api_key.is_none() => {
                return Err(DocMetaError::Config(
                    "ANTHROPIC_API_KEY is required for the claude caption backend".into(),
                )
                .into());
            }
            CaptionBackendKind::Gateway if caption.gateway_url.is_none() => {
                return Err(DocMetaError::Config(
                    "CAPTION_GATEWAY_URL is required for the gateway caption backend".into(),
                )
                .into());
            }
            _ => {}
        }
        if !caption.prompt_template.contains(CAPTION_PLACEHOLDER) {
            return Err(DocMetaError::Config(format!(
                "AI_PROMPT_GETCAPTION must contain the {CAPTION_PLACEHOLDER} placeholder"
            ))
            .into());
        }

        let service = ServiceConfig {
            interval: Duration::from_secs(60 * parse_or(&var, "INTERVAL_MINUTES", 10u64)?.max(1)),
            only_new: flag_or(&var, "GET_ONLY_NEW_ZIP_FILES", false)?,
        };

        let storage = StorageConfig {
            root: var("STORAGE_ROOT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./data")),
        };

        Ok(Self {
            storage,
            pipeline,
            ocr,
            caption,
            service,
        })
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            storage_root = %self.storage.root.display(),
            max_parallel_tasks = self.pipeline.max_parallel_tasks,
            max_parallel_archives = self.pipeline.max_parallel_archives,
            max_input_chars = self.pipeline.max_input_chars,
            max_caption_chars = self.pipeline.max_caption_chars,
            overwrite_metadata = self.pipeline.overwrite_metadata,
            "Pipeline config"
        );
        info!(
            backend = ?self.ocr.backend,
            languages = %self.ocr.languages.join("+"),
            max_pages = self.ocr.max_pages,
            render_dpi = self.ocr.render_dpi,
            scratch_dir = %self.ocr.scratch_dir.display(),
            azure_endpoint = self.ocr.azure_endpoint.as_deref().unwrap_or("-"),
            azure_api_key = redact(self.ocr.azure_api_key.as_deref()),
            "OCR config"
        );
        info!(
            backend = ?self.caption.backend,
            model = %self.caption.model,
            anthropic_api_key = redact(self.caption.anthropic_api_key.as_deref()),
            gateway_url = self.caption.gateway_url.as_deref().unwrap_or("-"),
            "Caption config"
        );
        info!(
            interval_secs = self.service.interval.as_secs(),
            only_new = self.service.only_new,
            "Service config"
        );
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
            .with_context(|| format!("{key} has an invalid value {raw:?}")),
        _ => Ok(default),
    }
}

/// Booleans accept any casing (`True`, `false`) plus `1`/`0`.
fn flag_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match var(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(DocMetaError::Config(format!("{key} has an invalid value {raw:?}")).into()),
        },
    }
}

fn split_languages(raw: &str) -> Vec<String> {
    raw.split(['+', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn redact(secret: Option<&str>) -> &'static str {
    match secret {
        Some(s) if !s.is_empty() => "****",
        _ => "(unset)",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::from_vars(vars(&[("ANTHROPIC_API_KEY", "sk-ant")])).unwrap();
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.pipeline.max_parallel_tasks, 5);
        assert_eq!(config.pipeline.max_input_chars, 8000);
        assert_eq!(config.pipeline.max_caption_chars, 50);
        assert_eq!(config.ocr.max_pages, 5);
        assert_eq!(config.ocr.languages, vec!["eng", "heb"]);
        assert_eq!(config.service.interval, Duration::from_secs(600));
        assert!(!config.service.only_new);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_vars(vars(&[
            ("CAPTION_BACKEND", "gateway"),
            ("CAPTION_GATEWAY_URL", "https://caption.local"),
            ("MAX_PARALLEL_TASKS", "3"),
            ("GET_ONLY_NEW_ZIP_FILES", "True"),
            ("OCR_LANGUAGES", "heb, eng"),
            ("INTERVAL_MINUTES", "1"),
        ]))
        .unwrap();
        assert_eq!(config.caption.backend, CaptionBackendKind::Gateway);
        assert_eq!(config.pipeline.max_parallel_tasks, 3);
        assert!(config.service.only_new);
        assert_eq!(config.ocr.languages, vec!["heb", "eng"]);
        assert_eq!(config.service.interval, Duration::from_secs(60));
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = Config::from_vars(vars(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("MAX_PARALLEL_TASKS", "many"),
        ]))
        .unwrap_err();
        assert!(format!("{err:#}").contains("MAX_PARALLEL_TASKS"));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        assert!(Config::from_vars(vars(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("MAX_PARALLEL_TASKS", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn backend_credentials_are_required() {
        assert!(Config::from_vars(vars(&[])).is_err());
        assert!(Config::from_vars(vars(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("OCR_BACKEND", "document-intelligence"),
        ]))
        .is_err());
    }

    #[test]
    fn prompt_must_carry_placeholder() {
        assert!(Config::from_vars(vars(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("AI_PROMPT_GETCAPTION", "caption this"),
        ]))
        .is_err());
    }
}
