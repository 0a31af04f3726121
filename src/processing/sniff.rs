//! Content-based MIME detection.
//!
//! Upload filenames are attacker controlled, so the type is inferred from leading signature
//! bytes only. Unknown content maps to a generic type rather than an error.

/// MIME type reported for PDF documents.
pub const MIME_PDF: &str = "application/pdf";
/// MIME type reported for PNG images.
pub const MIME_PNG: &str = "image/png";
/// MIME type reported for JPEG images.
pub const MIME_JPEG: &str = "image/jpeg";
/// MIME type reported for WebP images.
pub const MIME_WEBP: &str = "image/webp";

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Report a best-guess MIME type for `bytes`. Never fails.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.is_empty() {
        return "application/x-empty";
    }
    if bytes.starts_with(b"%PDF-") {
        return MIME_PDF;
    }
    if bytes.starts_with(PNG_SIGNATURE) {
        return MIME_PNG;
    }
    if bytes.starts_with(JPEG_SIGNATURE) {
        return MIME_JPEG;
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return MIME_WEBP;
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return "application/zip";
    }
    if !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok() {
        return "text/plain";
    }
    "application/octet-stream"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_registered_signatures() {
        assert_eq!(sniff_mime(b"%PDF-1.7\n%garbage"), MIME_PDF);
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), MIME_PNG);
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), MIME_JPEG);
        assert_eq!(sniff_mime(b"RIFF\x24\0\0\0WEBPVP8 "), MIME_WEBP);
    }

    #[test]
    fn ignores_riff_containers_that_are_not_webp() {
        assert_eq!(sniff_mime(b"RIFF\x24\0\0\0WAVEfmt "), "application/octet-stream");
    }

    #[test]
    fn falls_back_to_generic_types() {
        assert_eq!(sniff_mime(b""), "application/x-empty");
        assert_eq!(sniff_mime(b"just some notes"), "text/plain");
        assert_eq!(sniff_mime(b"GIF89a\x01\0"), "image/gif");
        assert_eq!(sniff_mime(&[0x00, 0x01, 0xFE]), "application/octet-stream");
    }

    #[test]
    fn pdf_marker_must_lead_the_buffer() {
        assert_eq!(sniff_mime(b"hello %PDF-1.4"), "text/plain");
    }
}
