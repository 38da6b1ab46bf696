use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use image::{GrayImage, Luma};
use tracing::debug;

use crate::error::{ExtractError, Result};

const RENDER_TIMEOUT: Duration = Duration::from_secs(120);

/// Rasterizes one page of a PDF on disk.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render 1-based `page` of `pdf` at `dpi` into `out_dir` and return the
    /// path of the written image.
    async fn render(&self, pdf: &Path, page: u32, dpi: u32, out_dir: &Path) -> Result<PathBuf>;
}

/// Poppler's `pdftoppm`, rendering grayscale PNGs.
pub struct Pdftoppm {
    bin: String,
}

impl Pdftoppm {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl PageRenderer for Pdftoppm {
    async fn render(&self, pdf: &Path, page: u32, dpi: u32, out_dir: &Path) -> Result<PathBuf> {
        let prefix = out_dir.join(format!("page-{page}"));
        let page_arg = page.to_string();

        let output = tokio::time::timeout(
            RENDER_TIMEOUT,
            tokio::process::Command::new(&self.bin)
                .arg("-r")
                .arg(dpi.to_string())
                .args(["-gray", "-png", "-singlefile"])
                .args(["-f", &page_arg, "-l", &page_arg])
                .arg(pdf)
                .arg(&prefix)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            ExtractError::Render(format!("{} timed out after {RENDER_TIMEOUT:?}", self.bin))
        })?
        .map_err(|e| ExtractError::Render(format!("failed to run {}: {e}", self.bin)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Render(format!(
                "{} exited with {} on page {page}: {}",
                self.bin,
                output.status,
                stderr.trim()
            )));
        }

        let path = prefix.with_extension("png");
        debug!(page, dpi, path = %path.display(), "Rendered page");
        Ok(path)
    }
}

/// Grayscale `input`, map every pixel at or above `threshold_percent` of full
/// intensity to white and the rest to black, and write a PNG to `output`.
/// Blocking; run it off the async runtime.
pub fn binarize(input: &Path, output: &Path, threshold_percent: u8) -> Result<()> {
    let gray = image::open(input)?.to_luma8();
    let bw = threshold(&gray, threshold_percent);
    bw.save(output)?;
    Ok(())
}

fn threshold(gray: &GrayImage, threshold_percent: u8) -> GrayImage {
    let cutoff = (u16::from(threshold_percent.min(100)) * 255 / 100) as u8;
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let Luma([v]) = *gray.get_pixel(x, y);
        Luma([if v >= cutoff { 255 } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_splits_at_percentage() {
        let gray = GrayImage::from_raw(4, 1, vec![0, 100, 166, 255]).unwrap();
        let bw = threshold(&gray, 65);
        assert_eq!(bw.into_raw(), vec![0, 0, 255, 255]);
    }

    #[test]
    fn binarize_writes_a_two_tone_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        GrayImage::from_fn(8, 8, |x, _| Luma([(x * 32) as u8]))
            .save(&input)
            .unwrap();

        binarize(&input, &output, 65).unwrap();

        let bw = image::open(&output).unwrap().to_luma8();
        assert_eq!(bw.dimensions(), (8, 8));
        assert!(bw.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[tokio::test]
    async fn missing_renderer_binary_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Pdftoppm::new("definitely-not-pdftoppm-binary");
        let err = renderer
            .render(&dir.path().join("doc.pdf"), 1, 300, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Render(_)));
    }
}
