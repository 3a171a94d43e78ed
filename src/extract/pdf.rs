//! Naive PDF text extraction.
//!
//! Scans uncompressed content streams for `BT`/`ET` text objects and
//! collects the parenthesized string operands of `Tj`/`TJ` operators.
//! Compressed streams yield nothing. This path is config-gated and never
//! used by default; HTML remains the primary source format.

use crate::core::ExtractedDoc;

/// Extracts plain text from PDF bytes. Returns an empty document when no
/// text operators are found (e.g. fully compressed streams).
#[must_use]
pub fn extract_pdf(bytes: &[u8]) -> ExtractedDoc {
    let mut text = String::new();
    let mut offset = 0;

    while let Some(start) = find(bytes, offset, b"BT") {
        let Some(end) = find(bytes, start + 2, b"ET") else {
            break;
        };
        let object = &bytes[start + 2..end];
        let line = strings_in_object(object);
        if !line.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&line);
        }
        offset = end + 2;
    }

    ExtractedDoc {
        title: String::new(),
        text,
    }
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Collects `(...)` string literals from a text object, handling the
/// `\(`, `\)`, and `\\` escapes.
fn strings_in_object(object: &[u8]) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    let mut escaped = false;
    let mut current = String::new();

    for &byte in object {
        if depth == 0 {
            if byte == b'(' {
                depth = 1;
                current.clear();
            }
            continue;
        }
        if escaped {
            match byte {
                b'n' => current.push('\n'),
                b't' => current.push('\t'),
                _ => current.push(char::from(byte)),
            }
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'(' => {
                depth += 1;
                current.push('(');
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    if !out.is_empty() && !current.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&current);
                } else {
                    current.push(')');
                }
            }
            _ => current.push(char::from(byte)),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_tj_strings() {
        let pdf = b"%PDF-1.4\nBT /F1 12 Tf (Hello) Tj (world) Tj ET\ntrailer";
        let doc = extract_pdf(pdf);
        assert_eq!(doc.text, "Hello world");
    }

    #[test]
    fn test_multiple_text_objects_become_lines() {
        let pdf = b"BT (first line) Tj ET junk BT (second line) Tj ET";
        let doc = extract_pdf(pdf);
        assert_eq!(doc.text, "first line\nsecond line");
    }

    #[test]
    fn test_escapes_in_strings() {
        let pdf = br"BT (paren \( inside \) and \\ slash) Tj ET";
        let doc = extract_pdf(pdf);
        assert_eq!(doc.text, r"paren ( inside ) and \ slash");
    }

    #[test]
    fn test_compressed_stream_yields_nothing() {
        let doc = extract_pdf(b"%PDF-1.7 stream x\x9c\x0b\xc9 endstream");
        assert!(doc.text.is_empty());
    }

    #[test]
    fn test_unterminated_object_is_safe() {
        let doc = extract_pdf(b"BT (never closed");
        assert!(doc.text.is_empty());
    }
}
