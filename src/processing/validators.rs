//! Content validators keyed by sniffed MIME type.
//!
//! Each validator checks structural integrity for one family of formats and reports the
//! canonical [`DocumentType`]. New formats are added with [`ValidatorRegistry::register`];
//! dispatch never changes.

use super::sniff::{MIME_JPEG, MIME_PDF, MIME_PNG, MIME_WEBP, sniff_mime};
use super::types::{DocumentType, ValidationError};
use image::{ImageReader, Limits};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

/// Capability shared by every format validator.
pub trait DocumentValidator: Send + Sync {
    /// Canonical type reported when validation succeeds.
    fn document_type(&self) -> DocumentType;

    /// Check that `bytes` hold a usable document of this format.
    fn validate(&self, bytes: &[u8]) -> Result<(), ValidationError>;
}

/// Accepts byte streams that parse as a PDF document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfValidator;

impl DocumentValidator for PdfValidator {
    fn document_type(&self) -> DocumentType {
        DocumentType::Pdf
    }

    fn validate(&self, bytes: &[u8]) -> Result<(), ValidationError> {
        lopdf::Document::load_mem(bytes)
            .map(|_| ())
            .map_err(|error| ValidationError::Invalid(format!("Invalid PDF file: {error}")))
    }
}

/// Accepts decodable raster images no larger than `max_dimension` on either side.
#[derive(Debug, Clone, Copy)]
pub struct ImageValidator {
    max_dimension: u32,
}

impl ImageValidator {
    /// Build a validator enforcing the given pixel bound.
    pub const fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl DocumentValidator for ImageValidator {
    fn document_type(&self) -> DocumentType {
        DocumentType::Image
    }

    fn validate(&self, bytes: &[u8]) -> Result<(), ValidationError> {
        // Header only; the pixel buffer is never allocated for an image over the bound.
        let mut header = image_reader(bytes)?;
        header.no_limits();
        let (width, height) = header.into_dimensions().map_err(invalid_image)?;
        if width > self.max_dimension || height > self.max_dimension {
            return Err(ValidationError::Invalid(format!(
                "Image dimensions too large: {width}x{height} exceeds {}",
                self.max_dimension
            )));
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        let mut reader = image_reader(bytes)?;
        reader.limits(limits);
        reader.decode().map(|_| ()).map_err(invalid_image)
    }
}

fn image_reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, ValidationError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(invalid_image)
}

fn invalid_image(error: impl std::fmt::Display) -> ValidationError {
    ValidationError::Invalid(format!("Invalid image file: {error}"))
}

/// Maps sniffed MIME types to the validator responsible for them.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<&'static str, Arc<dyn DocumentValidator>>,
}

impl ValidatorRegistry {
    /// Registry covering PDF, PNG, JPEG and WebP.
    pub fn with_defaults(max_image_dimension: u32) -> Self {
        let image: Arc<dyn DocumentValidator> = Arc::new(ImageValidator::new(max_image_dimension));
        let mut registry = Self::default();
        registry.register(MIME_PDF, Arc::new(PdfValidator));
        registry.register(MIME_PNG, image.clone());
        registry.register(MIME_JPEG, image.clone());
        registry.register(MIME_WEBP, image);
        registry
    }

    /// Install or replace the validator for `mime`.
    pub fn register(&mut self, mime: &'static str, validator: Arc<dyn DocumentValidator>) {
        self.validators.insert(mime, validator);
    }

    /// MIME types that currently have a validator.
    pub fn supported_mime_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.validators.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Sniff, dispatch, and validate `bytes`, returning the canonical document type.
    pub fn validate_document(&self, bytes: &[u8]) -> Result<DocumentType, ValidationError> {
        let mime = sniff_mime(bytes);
        let validator = self
            .validators
            .get(mime)
            .ok_or_else(|| ValidationError::UnsupportedType {
                mime: mime.to_string(),
            })?;

        validator.validate(bytes)?;
        let document_type = validator.document_type();
        tracing::debug!(mime, %document_type, bytes = bytes.len(), "Document validated");
        Ok(document_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::fixtures::{pdf_with_pages, png_bytes, png_header_only};

    fn registry() -> ValidatorRegistry {
        ValidatorRegistry::with_defaults(64)
    }

    #[test]
    fn accepts_well_formed_pdf() {
        let bytes = pdf_with_pages(&["Hello "]);
        assert_eq!(registry().validate_document(&bytes).unwrap(), DocumentType::Pdf);
    }

    #[test]
    fn truncated_pdf_is_a_validation_error() {
        let bytes = pdf_with_pages(&["Hello ", "World"]);
        let truncated = &bytes[..24];
        let error = registry().validate_document(truncated).unwrap_err();
        assert!(
            matches!(
                error,
                ValidationError::Invalid(ref message) if message.starts_with("Invalid PDF file")
            ),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn pdf_header_with_garbage_body_is_rejected() {
        let error = registry()
            .validate_document(b"%PDF-1.4\nthis is not a pdf")
            .unwrap_err();
        assert!(matches!(error, ValidationError::Invalid(_)));
    }

    #[test]
    fn accepts_small_png() {
        let bytes = png_bytes(32, 16);
        assert_eq!(
            registry().validate_document(&bytes).unwrap(),
            DocumentType::Image
        );
    }

    #[test]
    fn oversized_image_is_rejected_with_dimension_message() {
        let bytes = png_bytes(65, 10);
        let error = registry().validate_document(&bytes).unwrap_err();
        match error {
            ValidationError::Invalid(message) => {
                assert!(message.contains("dimensions too large"), "{message}");
                assert!(message.contains("65x10"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn huge_image_is_rejected_from_its_header() {
        // 14000x14000 RGB would need far more memory than the decoder allows.
        let bytes = png_header_only(14_000, 14_000);
        let error = ValidatorRegistry::with_defaults(4096)
            .validate_document(&bytes)
            .unwrap_err();
        assert!(
            matches!(
                error,
                ValidationError::Invalid(ref message)
                    if message == "Image dimensions too large: 14000x14000 exceeds 4096"
            ),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn undecodable_pixels_within_bounds_are_corrupt() {
        let error = registry()
            .validate_document(&png_header_only(32, 32))
            .unwrap_err();
        assert!(
            matches!(
                error,
                ValidationError::Invalid(ref message) if message.starts_with("Invalid image file")
            ),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn corrupt_png_is_rejected_with_decode_message() {
        let mut bytes = png_bytes(8, 8);
        bytes.truncate(20);
        let error = registry().validate_document(&bytes).unwrap_err();
        assert!(
            matches!(
                error,
                ValidationError::Invalid(ref message) if message.starts_with("Invalid image file")
            ),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn plain_text_is_unsupported() {
        let error = registry()
            .validate_document(b"plain text notes")
            .unwrap_err();
        assert!(matches!(
            error,
            ValidationError::UnsupportedType { ref mime } if mime == "text/plain"
        ));
    }

    #[test]
    fn registering_a_validator_extends_dispatch() {
        struct AnyText;
        impl DocumentValidator for AnyText {
            fn document_type(&self) -> DocumentType {
                DocumentType::Pdf
            }
            fn validate(&self, _bytes: &[u8]) -> Result<(), ValidationError> {
                Ok(())
            }
        }

        let mut registry = registry();
        registry.register("text/plain", Arc::new(AnyText));
        assert!(registry.validate_document(b"now accepted").is_ok());
        assert!(registry.supported_mime_types().contains(&"text/plain"));
    }
}
