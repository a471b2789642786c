/// A paragraph detected within a single page (§4.2).
#[derive(Debug, Clone)]
pub struct Paragraph {
    pub id: String,
    pub page: u32,
    pub start: usize,
    pub end: usize,
    pub content: String,
    pub confidence: f64,
}

/// Splits page text on one-or-more blank lines and scores each paragraph's
/// confidence (§4.2): start at 0.5, +0.2 for ≥2 sentence terminators, +0.2
/// for length in [50, 1000], -0.3 for length < 20; clamp to [0, 1].
pub fn detect_paragraphs(page_text: &str, page_number: u32) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut cursor = 0usize;
    let mut index = 0usize;

    for block in split_on_blank_lines(page_text) {
        let trimmed = block.trim();
        let block_start = page_text[cursor..]
            .find(trimmed)
            .map(|rel| cursor + rel)
            .unwrap_or(cursor);
        let block_end = block_start + trimmed.len();
        cursor = block_end;

        if trimmed.is_empty() {
            continue;
        }

        paragraphs.push(Paragraph {
            id: format!("p{page_number}-{index}"),
            page: page_number,
            start: block_start,
            end: block_end,
            content: trimmed.to_string(),
            confidence: score_confidence(trimmed),
        });
        index += 1;
    }

    paragraphs
}

fn split_on_blank_lines(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut blank_run = 0;

    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if blank_run > 0 && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        blank_run = 0;
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn score_confidence(content: &str) -> f64 {
    let mut confidence = 0.5;

    let terminators = content.chars().filter(|c| matches!(c, '.' | '!' | '?')).count();
    if terminators >= 2 {
        confidence += 0.2;
    }

    let len = content.len();
    if (50..=1000).contains(&len) {
        confidence += 0.2;
    }
    if len < 20 {
        confidence -= 0.3;
    }

    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_paragraphs_on_blank_lines() {
        let text = "First paragraph here.\n\nSecond paragraph follows.";
        let paras = detect_paragraphs(text, 1);
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].id, "p1-0");
        assert_eq!(paras[1].id, "p1-1");
    }

    #[test]
    fn confidence_within_bounds() {
        let paras = detect_paragraphs("Short.", 1);
        for p in &paras {
            assert!(p.confidence >= 0.0 && p.confidence <= 1.0);
            assert!(p.end >= p.start);
        }
    }

    #[test]
    fn short_paragraph_scores_lower() {
        let paras = detect_paragraphs("Hi.", 1);
        assert_eq!(paras.len(), 1);
        assert!(paras[0].confidence < 0.5);
    }

    #[test]
    fn long_well_formed_paragraph_scores_higher() {
        let content = "This is a well formed paragraph. It has multiple sentences! \
            Enough length to land in the favorable range for the length bonus.";
        let paras = detect_paragraphs(content, 1);
        assert_eq!(paras.len(), 1);
        assert!(paras[0].confidence >= 0.9);
    }
}
