//! Builds the pipeline from [`Config`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use docmeta_common::{CaptionBackendKind, Config, OcrBackendKind, OcrConfig};
use docmeta_ocr::{DocumentIntelligence, ExtractorOptions, OcrBackend, Pdftoppm, TesseractCli, TextExtractor};
use docmeta_storage::{FsStore, Storage};

use crate::archive::ArchiveProcessor;
use crate::batch::BatchOrchestrator;
use crate::caption::{CaptionBackend, CaptionGenerator, ClaudeCaptioner, GatewayCaptioner};
use crate::worker::FileWorker;

const OCR_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub fn storage(config: &Config) -> Arc<dyn Storage> {
    Arc::new(FsStore::new(&config.storage.root))
}

pub fn ocr_backend(config: &OcrConfig) -> Result<Arc<dyn OcrBackend>> {
    let backend: Arc<dyn OcrBackend> = match config.backend {
        OcrBackendKind::Tesseract => Arc::new(TesseractCli::new(&config.tesseract_bin, &config.scratch_dir)),
        OcrBackendKind::DocumentIntelligence => {
            let endpoint = config
                .azure_endpoint
                .as_deref()
                .context("AZURE_ENDPOINT is not set")?;
            let key = config.azure_api_key.clone().context("AZURE_API_KEY is not set")?;
            Arc::new(DocumentIntelligence::new(endpoint, key, OCR_HTTP_TIMEOUT)?)
        }
    };
    info!(backend = backend.name(), "OCR backend ready");
    Ok(backend)
}

pub fn extractor(config: &OcrConfig) -> Result<TextExtractor> {
    std::fs::create_dir_all(&config.scratch_dir)
        .with_context(|| format!("Failed to create scratch dir {}", config.scratch_dir.display()))?;

    let options = ExtractorOptions {
        languages: config.languages.clone(),
        max_pages: u32::try_from(config.max_pages).unwrap_or(u32::MAX),
        render_dpi: config.render_dpi,
        binarize_threshold: config.binarize_threshold,
        scratch_dir: config.scratch_dir.clone(),
    };
    Ok(TextExtractor::new(
        ocr_backend(config)?,
        Arc::new(Pdftoppm::new(&config.pdftoppm_bin)),
        options,
    ))
}

pub fn caption_backend(config: &Config) -> Result<Arc<dyn CaptionBackend>> {
    let backend: Arc<dyn CaptionBackend> = match config.caption.backend {
        CaptionBackendKind::Claude => Arc::new(ClaudeCaptioner::from_config(&config.caption)?),
        CaptionBackendKind::Gateway => Arc::new(GatewayCaptioner::from_config(&config.caption)?),
    };
    info!(backend = backend.name(), "Caption backend ready");
    Ok(backend)
}

pub fn processor(config: &Config, storage: Arc<dyn Storage>) -> Result<ArchiveProcessor> {
    let worker = FileWorker::new(
        Arc::new(extractor(&config.ocr)?),
        Arc::new(CaptionGenerator::from_config(caption_backend(config)?, &config.pipeline)),
    );
    Ok(ArchiveProcessor::new(storage, Arc::new(worker), &config.pipeline))
}

pub fn orchestrator(config: &Config) -> Result<BatchOrchestrator> {
    let storage = storage(config);
    let processor = processor(config, storage.clone())?;
    Ok(BatchOrchestrator::new(
        storage,
        Arc::new(processor),
        config.pipeline.max_parallel_archives,
    ))
}
