use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const OCR_TIMEOUT: Duration = Duration::from_secs(30);

/// OCR collaborator seam. Text extraction always runs as a baseline signal
/// during ingestion; implementations report failure as empty text, never
/// as an error, so a broken OCR setup degrades search instead of aborting
/// a batch.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extracts visible text from the image at `path`. Empty on failure.
    async fn extract(&self, path: &Path) -> String;
}

/// No-op extractor for collections where OCR is not wanted or available.
pub struct NoOcr;

#[async_trait]
impl TextExtractor for NoOcr {
    async fn extract(&self, _path: &Path) -> String {
        String::new()
    }
}

/// Extracts text by invoking the `tesseract` binary as a subprocess
/// (`tesseract <file> stdout -l <lang>`). A missing binary, non-zero
/// exit, or timeout all yield empty text.
pub struct TesseractCli {
    lang: String,
}

impl TesseractCli {
    /// Creates an extractor for the given tesseract language code.
    pub fn new(lang: impl Into<String>) -> Self {
        Self { lang: lang.into() }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("eng")
    }
}

#[async_trait]
impl TextExtractor for TesseractCli {
    async fn extract(&self, path: &Path) -> String {
        let run = Command::new("tesseract")
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .output();

        match tokio::time::timeout(OCR_TIMEOUT, run).await {
            Ok(Ok(output)) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(Ok(output)) => {
                debug!(path = %path.display(), status = %output.status, "tesseract failed");
                String::new()
            }
            Ok(Err(e)) => {
                debug!(path = %path.display(), error = %e, "tesseract not runnable");
                String::new()
            }
            Err(_) => {
                debug!(path = %path.display(), "tesseract timed out");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_ocr_returns_empty() {
        assert_eq!(NoOcr.extract(Path::new("/any.jpg")).await, "");
    }

    #[tokio::test]
    async fn missing_input_yields_empty_not_error() {
        // Whether or not tesseract is installed, a bad input must come
        // back as empty text.
        let ocr = TesseractCli::default();
        assert_eq!(ocr.extract(Path::new("/nonexistent/x.jpg")).await, "");
    }
}
