use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::backend::OcrBackend;
use crate::error::{ExtractError, Result};

const TESSERACT_TIMEOUT: Duration = Duration::from_secs(120);

/// Local OCR through the `tesseract` command line.
///
/// The image is spooled to a temp file under `scratch_dir` for the duration
/// of the call; recognized text is read from stdout.
pub struct TesseractCli {
    bin: String,
    scratch_dir: PathBuf,
}

impl TesseractCli {
    pub fn new(bin: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            scratch_dir: scratch_dir.into(),
        }
    }
}

#[async_trait]
impl OcrBackend for TesseractCli {
    async fn recognize(&self, image: Bytes, languages: &[String]) -> Result<String> {
        let scratch_dir = self.scratch_dir.clone();
        let input = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let mut file = tempfile::Builder::new()
                .prefix("docmeta-ocr-")
                .tempfile_in(scratch_dir)?;
            file.write_all(&image)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await??;

        let mut cmd = tokio::process::Command::new(&self.bin);
        cmd.arg(&*input).arg("stdout");
        if !languages.is_empty() {
            cmd.arg("-l").arg(languages.join("+"));
        }

        let output = tokio::time::timeout(TESSERACT_TIMEOUT, cmd.kill_on_drop(true).output())
            .await
            .map_err(|_| {
                ExtractError::Ocr(format!("{} timed out after {TESSERACT_TIMEOUT:?}", self.bin))
            })?
            .map_err(|e| ExtractError::Ocr(format!("failed to run {}: {e}", self.bin)))?;

        // `input` drops here and removes the spooled image.
        drop(input);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Ocr(format!(
                "{} exited with {}: {}",
                self.bin,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), "Tesseract finished");
        Ok(text)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}
