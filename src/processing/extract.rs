//! Text extraction for validated documents.
//!
//! PDFs are read from their embedded text layer with `lopdf`; images are decoded to confirm they
//! are readable and then handed to an [`OcrEngine`]. Both paths are synchronous and should be
//! driven from a blocking thread.

use super::types::{DocumentType, ExtractedText, ExtractionError};
use crate::config::Config;
use image::ImageReader;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Recognizes text in an image file.
pub trait OcrEngine: Send + Sync {
    /// Return the raw recognized text for the image at `path`.
    fn recognize(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// OCR engine that shells out to the `tesseract` command line tool.
///
/// Runs with page segmentation mode 6 (a single uniform block of text) and one fixed language.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
    language: String,
}

impl TesseractCli {
    /// Build an engine invoking `command` with the given tesseract language code.
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new(&self.command)
            .arg(path)
            .arg("stdout")
            .args(["-l", &self.language, "--psm", "6"])
            .output()
            .map_err(|error| {
                ExtractionError::Ocr(format!("failed to run {}: {error}", self.command))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Ocr(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Dispatches extraction by document type.
#[derive(Clone)]
pub struct TextExtractor {
    ocr: Arc<dyn OcrEngine>,
}

impl TextExtractor {
    /// Build an extractor using the supplied OCR engine for images.
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    /// Build an extractor backed by the configured tesseract binary and language.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(TesseractCli::new(
            config.tesseract_cmd.clone(),
            config.ocr_language.clone(),
        )))
    }

    /// Extract all text from the document at `path`.
    pub fn extract(
        &self,
        document_type: DocumentType,
        path: &Path,
    ) -> Result<ExtractedText, ExtractionError> {
        if !path.exists() {
            return Err(ExtractionError::NotFound(path.to_path_buf()));
        }

        match document_type {
            DocumentType::Pdf => extract_pdf(path),
            DocumentType::Image => self.extract_image(path),
        }
    }

    /// Run [`TextExtractor::extract`] on the blocking thread pool.
    pub async fn extract_blocking(
        &self,
        document_type: DocumentType,
        path: PathBuf,
    ) -> Result<ExtractedText, ExtractionError> {
        let extractor = self.clone();
        tokio::task::spawn_blocking(move || extractor.extract(document_type, &path))
            .await
            .map_err(|error| ExtractionError::Worker(error.to_string()))?
    }

    fn extract_image(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
        let image_error = |message: String| ExtractionError::Image {
            path: path.to_path_buf(),
            message,
        };
        // Stored uploads may carry a generic extension, so the format comes from the bytes.
        ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|error| image_error(error.to_string()))?
            .decode()
            .map_err(|error| image_error(error.to_string()))?;

        let text = self.ocr.recognize(path)?.trim().to_string();
        if text.is_empty() {
            tracing::warn!(document = %path.display(), "No text extracted from image");
        }

        Ok(ExtractedText {
            text,
            page_count: None,
        })
    }
}

fn extract_pdf(path: &Path) -> Result<ExtractedText, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document = lopdf::Document::load_mem(&bytes).map_err(|error| ExtractionError::Pdf {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;

    let pages = document.get_pages();
    tracing::info!(document = %path.display(), pages = pages.len(), "Extracting PDF text");

    let mut page_texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        let raw = match document.extract_text(&[*page_number]) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(
                    document = %path.display(),
                    page = page_number,
                    error = %error,
                    "Page text layer could not be decoded"
                );
                String::new()
            }
        };
        page_texts.push(normalize_page_text(&raw));
    }

    Ok(ExtractedText {
        text: page_texts.join(" "),
        page_count: Some(pages.len()),
    })
}

/// Drop NUL characters and the line break emitted after the last text object on a page.
fn normalize_page_text(raw: &str) -> String {
    raw.replace('\0', "")
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::fixtures::{pdf_with_pages, png_bytes};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FixedOcr {
        text: &'static str,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl FixedOcr {
        fn new(text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                text,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl OcrEngine for FixedOcr {
        fn recognize(&self, path: &Path) -> Result<String, ExtractionError> {
            self.seen.lock().unwrap().push(path.to_path_buf());
            Ok(self.text.to_string())
        }
    }

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn pdf_pages_are_joined_with_a_single_space() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "doc.pdf", &pdf_with_pages(&["Hello ", "World"]));

        let extracted = TextExtractor::new(FixedOcr::new(""))
            .extract(DocumentType::Pdf, &path)
            .unwrap();

        assert_eq!(extracted.text, "Hello  World");
        assert_eq!(extracted.page_count, Some(2));
    }

    #[test]
    fn single_page_pdf_reports_one_page() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "one.pdf", &pdf_with_pages(&["Only page"]));

        let extracted = TextExtractor::new(FixedOcr::new(""))
            .extract(DocumentType::Pdf, &path)
            .unwrap();

        assert_eq!(extracted.text, "Only page");
        assert_eq!(extracted.page_count, Some(1));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.pdf");

        let error = TextExtractor::new(FixedOcr::new(""))
            .extract(DocumentType::Pdf, &path)
            .unwrap_err();

        assert!(matches!(error, ExtractionError::NotFound(ref missing) if missing == &path));
    }

    #[test]
    fn unparseable_pdf_is_an_extraction_error() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "broken.pdf", b"%PDF-1.4\nnot really");

        let error = TextExtractor::new(FixedOcr::new(""))
            .extract(DocumentType::Pdf, &path)
            .unwrap_err();

        assert!(matches!(error, ExtractionError::Pdf { .. }));
    }

    #[test]
    fn image_text_comes_from_ocr_and_is_trimmed() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "scan.png", &png_bytes(20, 20));
        let ocr = FixedOcr::new("  invoice total 42\n\n");

        let extracted = TextExtractor::new(ocr.clone())
            .extract(DocumentType::Image, &path)
            .unwrap();

        assert_eq!(extracted.text, "invoice total 42");
        assert_eq!(extracted.page_count, None);
        assert_eq!(ocr.seen.lock().unwrap().as_slice(), &[path]);
    }

    #[test]
    fn blank_image_yields_empty_text_and_a_warning() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "blank.png", &png_bytes(10, 10));
        let logs = Arc::new(Mutex::new(Vec::new()));
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || LogBuffer(writer.clone()))
            .with_ansi(false)
            .finish();

        let extracted = tracing::subscriber::with_default(subscriber, || {
            TextExtractor::new(FixedOcr::new(" \n"))
                .extract(DocumentType::Image, &path)
                .unwrap()
        });

        assert!(extracted.text.is_empty());
        let output = String::from_utf8(logs.lock().unwrap().clone()).unwrap();
        let warning = output
            .lines()
            .find(|line| line.contains("No text extracted from image"))
            .unwrap_or_else(|| panic!("no warning in logs: {output}"));
        assert!(warning.contains("WARN"), "{warning}");
    }

    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn undecodable_image_is_rejected_before_ocr() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "bad.png", b"\x89PNG\r\n\x1a\nbroken");
        let ocr = FixedOcr::new("never used");

        let error = TextExtractor::new(ocr.clone())
            .extract(DocumentType::Image, &path)
            .unwrap_err();

        assert!(matches!(error, ExtractionError::Image { .. }));
        assert!(ocr.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_tesseract_binary_is_an_ocr_error() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "scan.png", &png_bytes(4, 4));
        let engine = TesseractCli::new("docsift-no-such-tesseract", "eng");

        let error = engine.recognize(&path).unwrap_err();

        assert!(matches!(
            error,
            ExtractionError::Ocr(ref message) if message.contains("failed to run")
        ));
    }

    #[tokio::test]
    async fn blocking_extraction_matches_direct_call() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "doc.pdf", &pdf_with_pages(&["Async "]));

        let extractor = TextExtractor::new(FixedOcr::new(""));
        let direct = extractor.extract(DocumentType::Pdf, &path).unwrap();
        let extracted = extractor
            .extract_blocking(DocumentType::Pdf, path)
            .await
            .unwrap();

        assert_eq!(extracted, direct);
        assert_eq!(extracted.text, "Async ");
    }

    #[test]
    fn page_normalization_strips_nul_and_trailing_breaks() {
        assert_eq!(normalize_page_text("a\0b\r\n"), "ab");
        assert_eq!(normalize_page_text("Hello \n"), "Hello ");
    }
}
