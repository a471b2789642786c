use crate::error::{CoreError, CoreResult};

const MIN_PDF_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailureKind {
    XrefCorruption,
    InvalidFormat,
    TruncatedFile,
    EncryptedPdf,
    TooSmall,
    MissingEof,
    Unknown,
}

/// Binary pre-validation (§4.2): minimum size, `%PDF-` header, an EOF
/// marker, and either a cross-reference keyword or stream type tag. Runs
/// before pdfium ever sees the bytes.
pub fn validate_pdf_bytes(bytes: &[u8]) -> CoreResult<()> {
    if bytes.len() < MIN_PDF_SIZE {
        return Err(CoreError::InvalidPdf(
            "file is smaller than the minimum valid PDF size".to_string(),
        ));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(CoreError::InvalidPdf(
            "missing '%PDF-' header".to_string(),
        ));
    }
    if !contains(bytes, b"%%EOF") {
        return Err(CoreError::InvalidPdf(
            "missing end-of-file marker".to_string(),
        ));
    }
    let has_xref_keyword = contains(bytes, b"xref");
    let has_xref_stream = contains(bytes, b"/XRef");
    if !has_xref_keyword && !has_xref_stream {
        return Err(CoreError::InvalidPdf(
            "missing cross-reference keyword or stream".to_string(),
        ));
    }
    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

/// Classifies a pdfium error string into the §4.2 taxonomy. pdfium's error
/// messages are not a stable API, so this is necessarily heuristic,
/// matching on substrings the library is known to emit.
pub fn classify_parse_failure(message: &str) -> ParseFailureKind {
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ParseFailureKind::EncryptedPdf
    } else if lower.contains("xref") {
        ParseFailureKind::XrefCorruption
    } else if lower.contains("truncat") || lower.contains("unexpected end") {
        ParseFailureKind::TruncatedFile
    } else if lower.contains("format") || lower.contains("not a pdf") {
        ParseFailureKind::InvalidFormat
    } else if lower.contains("too small") || lower.contains("size") {
        ParseFailureKind::TooSmall
    } else if lower.contains("eof") {
        ParseFailureKind::MissingEof
    } else {
        ParseFailureKind::Unknown
    }
}
