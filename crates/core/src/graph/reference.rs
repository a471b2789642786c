use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::model::{DocumentGraph, Edge, EdgeType, Node, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Section,
    Figure,
    Table,
    Page,
    Citation,
    CrossReference,
}

/// A candidate reference found in a text node's content, not yet
/// materialized as a graph edge (§3).
#[derive(Debug, Clone)]
pub struct DetectedReference {
    pub reference_type: ReferenceType,
    pub matched_text: String,
    pub normalized_target: String,
    pub confidence: f64,
    pub start: usize,
    pub end: usize,
    pub context: String,
}

struct Pattern {
    reference_type: ReferenceType,
    regex: &'static LazyLock<Regex>,
    confidence: f64,
}

static RE_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSection\s+(\d+(?:\.\d+)*)\b").unwrap());
static RE_FIGURE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bFigure\s+(\d+)\b").unwrap());
static RE_TABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bTable\s+(\d+)\b").unwrap());
static RE_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:page|p\.)\s+(\d+)\b").unwrap());
static RE_CITATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());
static RE_CROSS_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsee\s+(above|below)\b").unwrap());

fn patterns() -> Vec<Pattern> {
    vec![
        Pattern {
            reference_type: ReferenceType::Section,
            regex: &RE_SECTION,
            confidence: 0.9,
        },
        Pattern {
            reference_type: ReferenceType::Figure,
            regex: &RE_FIGURE,
            confidence: 0.9,
        },
        Pattern {
            reference_type: ReferenceType::Table,
            regex: &RE_TABLE,
            confidence: 0.9,
        },
        Pattern {
            reference_type: ReferenceType::Page,
            regex: &RE_PAGE,
            confidence: 0.8,
        },
        Pattern {
            reference_type: ReferenceType::Citation,
            regex: &RE_CITATION,
            confidence: 0.7,
        },
        Pattern {
            reference_type: ReferenceType::CrossReference,
            regex: &RE_CROSS_REF,
            confidence: 0.5,
        },
    ]
}

const CONTEXT_RADIUS: usize = 40;

/// Scans `content` for section/figure/table/page/citation/cross-reference
/// mentions (§4.4 step 7). Returns every match; callers deduplicate and
/// resolve targets before materializing edges.
pub fn detect_references(content: &str) -> Vec<DetectedReference> {
    let mut found = Vec::new();
    for pattern in patterns() {
        for caps in pattern.regex.captures_iter(content) {
            let whole = caps.get(0).unwrap();
            let normalized_target = match pattern.reference_type {
                ReferenceType::Section => caps
                    .get(1)
                    .map(|m| format!("section:{}", m.as_str()))
                    .unwrap_or_default(),
                ReferenceType::Figure => caps
                    .get(1)
                    .map(|m| format!("figure:{}", m.as_str()))
                    .unwrap_or_default(),
                ReferenceType::Table => caps
                    .get(1)
                    .map(|m| format!("table:{}", m.as_str()))
                    .unwrap_or_default(),
                ReferenceType::Page => caps
                    .get(1)
                    .map(|m| format!("page:{}", m.as_str()))
                    .unwrap_or_default(),
                ReferenceType::Citation => caps
                    .get(1)
                    .map(|m| format!("citation:{}", m.as_str()))
                    .unwrap_or_default(),
                ReferenceType::CrossReference => "cross_reference".to_string(),
            };

            let start = whole.start();
            let end = whole.end();
            let ctx_start = start.saturating_sub(CONTEXT_RADIUS);
            let ctx_end = (end + CONTEXT_RADIUS).min(content.len());
            let context = safe_slice(content, ctx_start, ctx_end);

            found.push(DetectedReference {
                reference_type: pattern.reference_type,
                matched_text: whole.as_str().to_string(),
                normalized_target,
                confidence: pattern.confidence,
                start,
                end,
                context,
            });
        }
    }
    found
}

fn safe_slice(s: &str, start: usize, end: usize) -> String {
    let start = floor_char_boundary(s, start);
    let end = ceil_char_boundary(s, end);
    s[start..end].to_string()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Resolves a detected reference against table/image/section nodes and
/// materializes a `references` edge when exactly one target matches
/// (§4.4 step 7). Dedups identical (source, target) pairs as it goes via
/// the graph's own duplicate-triple rejection.
pub fn materialize_reference_edges(
    graph: &mut DocumentGraph,
    source_id: &str,
    detected: &[DetectedReference],
) {
    for reference in detected {
        let target = match resolve_target(graph, reference) {
            Some(t) => t,
            None => {
                tracing::debug!(
                    source = source_id,
                    matched = %reference.matched_text,
                    "dropping reference with no unique target"
                );
                continue;
            }
        };

        let edge = Edge {
            source: source_id.to_string(),
            target,
            edge_type: EdgeType::References,
            weight: reference.confidence,
            metadata: Default::default(),
        };
        // Duplicate (source, target, References) triples are silently
        // skipped; §4.4 calls this deduplication, not an error.
        let _ = graph.add_edge(edge);
    }
}

fn resolve_target(graph: &DocumentGraph, reference: &DetectedReference) -> Option<String> {
    match reference.reference_type {
        ReferenceType::Table => resolve_numbered(graph, NodeType::Table, &reference.normalized_target),
        ReferenceType::Figure => resolve_numbered(graph, NodeType::Image, &reference.normalized_target),
        ReferenceType::Section => resolve_section(graph, &reference.normalized_target),
        _ => None,
    }
}

fn resolve_numbered(graph: &DocumentGraph, node_type: NodeType, normalized: &str) -> Option<String> {
    let number = normalized.split(':').nth(1)?;
    let candidates: Vec<&Node> = graph
        .nodes_of_type(node_type)
        .into_iter()
        .filter(|n| {
            n.metadata
                .get("number")
                .and_then(|v| v.as_str())
                .map(|s| s == number)
                .unwrap_or(false)
                || n.content.contains(&format!(" {number}"))
                || n.label.ends_with(number)
        })
        .collect();
    match candidates.len() {
        1 => Some(candidates[0].id.clone()),
        _ => None,
    }
}

fn resolve_section(graph: &DocumentGraph, normalized: &str) -> Option<String> {
    let key = normalized.split(':').nth(1)?;
    let candidates: Vec<&Node> = graph
        .nodes_of_type(NodeType::Section)
        .into_iter()
        .filter(|n| n.label.contains(key))
        .collect();
    match candidates.len() {
        1 => Some(candidates[0].id.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_table_and_figure_references() {
        let refs = detect_references("As shown in Table 2 and Figure 3, results improve.");
        assert!(refs.iter().any(|r| r.reference_type == ReferenceType::Table));
        assert!(refs.iter().any(|r| r.reference_type == ReferenceType::Figure));
    }

    #[test]
    fn detects_section_reference() {
        let refs = detect_references("See Section 4.2 for details.");
        let hit = refs
            .iter()
            .find(|r| r.reference_type == ReferenceType::Section)
            .unwrap();
        assert_eq!(hit.normalized_target, "section:4.2");
    }

    #[test]
    fn no_references_in_plain_text() {
        let refs = detect_references("No pointers here at all.");
        assert!(refs.is_empty());
    }
}
