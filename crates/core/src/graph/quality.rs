//! Content-quality flags (SPEC_FULL §11): additive per-page metadata noting
//! low-value content (tables of contents, boilerplate, blank pages).
//!
//! This is *not* a pipeline stage — it never fails the build and never
//! gates summarization or evaluation. It is the English-only
//! generalization of the teacher's bilingual `trash.rs` detector, attached
//! to page nodes by the Graph Builder as one more piece of node metadata.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlagType {
    TableOfContents,
    Boilerplate,
    BlankPage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentQualityFlag {
    pub flag_type: QualityFlagType,
    pub confidence: f64,
    pub reason: String,
}

const BOILERPLATE_KEYWORDS: [&str; 5] = [
    "copyright",
    "all rights reserved",
    "disclaimer",
    "terms of use",
    "confidential",
];

/// Runs every detector over one page's raw text, returning whatever flags
/// apply. A page may carry more than one flag (e.g. a short boilerplate
/// page that is also nearly blank).
pub fn detect_quality_flags(text: &str) -> Vec<ContentQualityFlag> {
    let mut flags = Vec::new();
    if let Some(f) = detect_toc(text) {
        flags.push(f);
    }
    if let Some(f) = detect_boilerplate(text) {
        flags.push(f);
    }
    if let Some(f) = detect_blank(text) {
        flags.push(f);
    }
    flags
}

fn detect_toc(text: &str) -> Option<ContentQualityFlag> {
    let lower = text.to_lowercase();
    let has_heading = lower.contains("table of contents") || lower.contains("contents");

    let dot_leader_count = text
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            (trimmed.contains("...") || trimmed.contains('\u{2026}'))
                && trimmed.chars().last().map(|c| c.is_ascii_digit()).unwrap_or(false)
        })
        .count();

    if has_heading && dot_leader_count >= 3 {
        Some(ContentQualityFlag {
            flag_type: QualityFlagType::TableOfContents,
            confidence: 0.95,
            reason: format!("TOC heading found with {dot_leader_count} dot-leader lines"),
        })
    } else if has_heading {
        Some(ContentQualityFlag {
            flag_type: QualityFlagType::TableOfContents,
            confidence: 0.90,
            reason: "TOC heading keyword found".to_string(),
        })
    } else if dot_leader_count >= 5 {
        Some(ContentQualityFlag {
            flag_type: QualityFlagType::TableOfContents,
            confidence: 0.70,
            reason: format!("{dot_leader_count} dot-leader lines detected (possible TOC)"),
        })
    } else {
        None
    }
}

fn detect_boilerplate(text: &str) -> Option<ContentQualityFlag> {
    let lower = text.to_lowercase();
    let matched: Vec<&str> = BOILERPLATE_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .copied()
        .collect();

    if matched.len() >= 2 {
        Some(ContentQualityFlag {
            flag_type: QualityFlagType::Boilerplate,
            confidence: 0.85,
            reason: format!("Multiple boilerplate keywords: {}", matched.join(", ")),
        })
    } else if matched.len() == 1 && text.len() < 500 {
        Some(ContentQualityFlag {
            flag_type: QualityFlagType::Boilerplate,
            confidence: 0.65,
            reason: format!("Boilerplate keyword \"{}\" on short page ({} chars)", matched[0], text.len()),
        })
    } else {
        None
    }
}

fn detect_blank(text: &str) -> Option<ContentQualityFlag> {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    if lower.contains("this page intentionally left blank") || lower.contains("intentionally blank") {
        Some(ContentQualityFlag {
            flag_type: QualityFlagType::BlankPage,
            confidence: 0.95,
            reason: "Explicit blank page marker found".to_string(),
        })
    } else if trimmed.len() < 50 {
        Some(ContentQualityFlag {
            flag_type: QualityFlagType::BlankPage,
            confidence: 0.80,
            reason: format!("Nearly blank page ({} chars)", trimmed.len()),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_explicit_blank_marker() {
        let flags = detect_quality_flags("This page intentionally left blank");
        assert!(flags.iter().any(|f| f.flag_type == QualityFlagType::BlankPage && f.confidence == 0.95));
    }

    #[test]
    fn detects_toc_with_dot_leaders() {
        let text = "Table of Contents\nChapter 1 ..... 5\nChapter 2 ..... 12\nChapter 3 ..... 20";
        let flags = detect_quality_flags(text);
        assert!(flags.iter().any(|f| f.flag_type == QualityFlagType::TableOfContents));
    }

    #[test]
    fn detects_boilerplate_multiple_keywords() {
        let text = "Copyright 2026 Acme Corp. All rights reserved.";
        let flags = detect_quality_flags(text);
        assert!(flags.iter().any(|f| f.flag_type == QualityFlagType::Boilerplate));
    }

    #[test]
    fn no_false_positive_on_normal_paragraph() {
        let text = "This section describes the installation procedure in detail, \
                     covering prerequisites and common failure modes.";
        assert!(detect_quality_flags(text).is_empty());
    }
}
