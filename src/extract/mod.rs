//! Content extraction: HTML to normalized text, with an optional naive
//! PDF path behind a configuration flag.

pub mod html;
pub mod pdf;

pub use html::extract_html;
pub use pdf::extract_pdf;

use crate::core::ExtractedDoc;

/// Extracts text from fetched bytes based on the response content type.
///
/// Returns `None` for PDF payloads when PDF extraction is disabled.
/// Unknown content types are treated as HTML, which degrades to plain
/// text passthrough for text responses.
#[must_use]
pub fn extract_payload(body: &[u8], content_type: &str, enable_pdf: bool) -> Option<ExtractedDoc> {
    let lower = content_type.to_ascii_lowercase();
    if lower.contains("application/pdf") {
        if !enable_pdf {
            return None;
        }
        return Some(extract_pdf(body));
    }
    Some(extract_html(&String::from_utf8_lossy(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_disabled_by_default() {
        assert!(extract_payload(b"%PDF-1.4", "application/pdf", false).is_none());
    }

    #[test]
    fn test_pdf_enabled() {
        let doc = extract_payload(b"BT (text) Tj ET", "application/pdf", true);
        assert_eq!(doc.map(|d| d.text), Some("text".to_string()));
    }

    #[test]
    fn test_html_content_type() {
        let doc = extract_payload(
            b"<html><head><title>T</title></head><body><p>hi</p></body></html>",
            "text/html; charset=utf-8",
            false,
        );
        assert_eq!(doc.map(|d| d.text), Some("hi".to_string()));
    }
}
