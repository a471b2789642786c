use chrono::{DateTime, TimeZone, Utc};
use pdfium_render::prelude::PdfDocument;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub modification_date: Option<DateTime<Utc>>,
    pub page_count: u32,
    pub filename: Option<String>,
}

/// Extracts and sanitizes document metadata (§4.2): control characters are
/// stripped, empty strings become `None`, and PDF date strings that fail
/// to parse are dropped rather than faked.
pub fn extract_metadata(document: &PdfDocument, filename: Option<&str>) -> DocumentMetadata {
    let meta = document.metadata();

    DocumentMetadata {
        title: clean_field(meta.title().map(|v| v.value().to_string())),
        author: clean_field(meta.author().map(|v| v.value().to_string())),
        subject: clean_field(meta.subject().map(|v| v.value().to_string())),
        creator: clean_field(meta.creator().map(|v| v.value().to_string())),
        producer: clean_field(meta.producer().map(|v| v.value().to_string())),
        creation_date: meta
            .creation_date()
            .and_then(|v| parse_pdf_date(v.value())),
        modification_date: meta
            .modification_date()
            .and_then(|v| parse_pdf_date(v.value())),
        page_count: document.pages().len() as u32,
        filename: filename.map(|s| s.to_string()),
    }
}

fn clean_field(value: Option<String>) -> Option<String> {
    let stripped: String = value?
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Parses a PDF date string (`D:YYYYMMDDHHMMSS[+-HH'mm']`) into a UTC
/// timestamp. Returns `None` on anything unparsable, never a fabricated
/// fallback date.
fn parse_pdf_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.strip_prefix("D:").unwrap_or(raw);
    if s.len() < 14 {
        return None;
    }

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month: u32 = s.get(4..6)?.parse().ok()?;
    let day: u32 = s.get(6..8)?.parse().ok()?;
    let hour: u32 = s.get(8..10)?.parse().ok()?;
    let minute: u32 = s.get(10..12)?.parse().ok()?;
    let second: u32 = s.get(12..14)?.parse().ok()?;

    let naive = chrono::NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)?;

    let rest = &s[14..];
    let offset_seconds = parse_offset(rest).unwrap_or(0);

    let utc_naive = naive - chrono::Duration::seconds(offset_seconds as i64);
    Some(Utc.from_utc_datetime(&utc_naive))
}

/// Parses the trailing `[+-]HH'mm'` (or bare `Z`) offset of a PDF date.
fn parse_offset(rest: &str) -> Option<i32> {
    if rest.is_empty() || rest.starts_with('Z') {
        return Some(0);
    }
    let sign = match rest.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let digits: String = rest
        .chars()
        .skip(1)
        .filter(|c| c.is_ascii_digit())
        .take(4)
        .collect();
    if digits.len() < 4 {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    Some(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_pdf_date_with_offset() {
        let dt = parse_pdf_date("D:20230615120000+02'00'").unwrap();
        assert_eq!(dt.to_rfc3339(), "2023-06-15T10:00:00+00:00");
    }

    #[test]
    fn parses_pdf_date_without_offset() {
        let dt = parse_pdf_date("D:20230615120000").unwrap();
        assert_eq!(dt.format("%Y%m%d%H%M%S").to_string(), "20230615120000");
    }

    #[test]
    fn rejects_garbage_date() {
        assert!(parse_pdf_date("not a date").is_none());
    }

    #[test]
    fn clean_field_strips_control_chars_and_empties() {
        assert_eq!(clean_field(Some("\u{0}  \u{1}".to_string())), None);
        assert_eq!(
            clean_field(Some(" Title\u{0} ".to_string())),
            Some("Title".to_string())
        );
    }
}
