use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::image_extractor::ExtractedImage;
use crate::pdf::{DocumentMetadata, ParsedDocument};
use crate::table::looks_like_table;

use super::model::{DocumentGraph, Edge, EdgeType, Node, NodeType, Position};
use super::quality::detect_quality_flags;
use super::reference::{detect_references, materialize_reference_edges};

/// A table detected upstream (by a PDF table-extraction step outside this
/// crate's scope) and handed to the builder alongside parser/extractor
/// output (§4.4 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedTable {
    pub page: u32,
    pub rows: u32,
    pub cols: u32,
    pub raw_text: String,
    pub number: Option<u32>,
}

/// Everything the Graph Builder needs for one pass (§4.4).
pub struct BuildInput<'a> {
    pub parsed: &'a ParsedDocument,
    pub tables: &'a [DetectedTable],
    pub images: &'a [ExtractedImage],
}

const HEADING_MAX_LEN: usize = 80;
/// Lines repeated on at least this fraction of pages' first/last three
/// lines are treated as running headers/footers (SPEC_FULL §11) and
/// excluded from paragraph content.
const HEADER_FOOTER_THRESHOLD: f64 = 0.6;

/// Assembles the final graph in the fixed order of §4.4, ensuring every
/// invariant of §3 holds before returning.
pub fn build_graph(input: &BuildInput) -> CoreResult<DocumentGraph> {
    let mut graph = DocumentGraph::new();

    let doc_id = "doc-1".to_string();
    let doc_node = document_node(&doc_id, &input.parsed.metadata);
    graph.add_node(doc_node)?;

    let running_lines = detect_running_lines(input.parsed);

    let mut reference_sources: Vec<(String, String)> = Vec::new();

    for page in &input.parsed.pages {
        let page_id = format!("page-{}", page.page_number);
        graph.add_node(
            Node::new(&page_id, NodeType::Metadata, format!("Page {}", page.page_number))
                .with_position(Position {
                    page: page.page_number,
                    start: 0,
                    end: page.raw_text.len(),
                }),
        )?;
        graph.add_edge(contains(&doc_id, &page_id))?;

        // Additive metadata only (SPEC_FULL §11): never gates paragraph/
        // table/image extraction below, just annotates the page node.
        let quality_flags = detect_quality_flags(&page.raw_text);
        if !quality_flags.is_empty() {
            graph.set_node_metadata(&page_id, "qualityFlags", &quality_flags);
        }

        let mut previous_id: Option<String> = None;
        let mut contents_for_median: Vec<f64> = page
            .paragraphs
            .iter()
            .map(|p| p.content.len() as f64)
            .collect();
        contents_for_median.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median_len = median(&contents_for_median);

        let paragraphs = if page.paragraphs.is_empty() {
            // Edge case (§4.4): pages with no detected paragraphs synthesize
            // one fallback paragraph so downstream summarization never sees
            // an empty page.
            vec![crate::pdf::Paragraph {
                id: format!("p{}-0", page.page_number),
                page: page.page_number,
                start: 0,
                end: page.raw_text.len(),
                content: page.raw_text.clone(),
                confidence: 0.3,
            }]
        } else {
            page.paragraphs.clone()
        };

        for paragraph in &paragraphs {
            if is_running_line(&paragraph.content, &running_lines) {
                continue;
            }

            let is_heading = looks_like_heading(&paragraph.content, median_len);
            let node_type = if is_heading {
                NodeType::Section
            } else {
                NodeType::Paragraph
            };

            let mut node = Node::new(&paragraph.id, node_type, label_for(&paragraph.content))
                .with_content(paragraph.content.clone())
                .with_position(Position {
                    page: paragraph.page,
                    start: paragraph.start,
                    end: paragraph.end,
                });
            node.set_meta("confidence", paragraph.confidence);
            node.set_meta("extractionMethod", "pdf-text");

            let is_table_like = looks_like_table(&paragraph.content);
            let node = if is_table_like && node_type == NodeType::Paragraph {
                let mut table_node = Node::new(
                    format!("{}-table", paragraph.id),
                    NodeType::Table,
                    "Table (inferred)",
                )
                .with_content(paragraph.content.clone())
                .with_position(node.position);
                table_node.set_meta("inferred", true);
                table_node
            } else {
                node
            };

            graph.add_node(node.clone())?;
            graph.add_edge(contains(&page_id, &node.id))?;

            if let Some(prev) = &previous_id {
                let _ = graph.add_edge(Edge {
                    source: prev.clone(),
                    target: node.id.clone(),
                    edge_type: EdgeType::Follows,
                    weight: 1.0,
                    metadata: Default::default(),
                });
            }
            previous_id = Some(node.id.clone());
            reference_sources.push((node.id.clone(), node.content.clone()));
        }

        for table in input.tables.iter().filter(|t| t.page == page.page_number) {
            let table_id = format!("table-{}-{}", page.page_number, table_index(table));
            let mut node = Node::new(
                &table_id,
                NodeType::Table,
                format!("Table: {}x{}", table.rows, table.cols),
            )
            .with_content(table.raw_text.clone())
            .with_position(Position {
                page: page.page_number,
                start: 0,
                end: table.raw_text.len(),
            });
            if let Some(n) = table.number {
                node.set_meta("number", n.to_string());
            }
            graph.add_node(node)?;
            graph.add_edge(contains(&page_id, &table_id))?;
        }

        for image in input.images.iter().filter(|i| i.page_number == page.page_number) {
            let image_id = format!("image-{}-{}", page.page_number, image.image_number);
            let stem = format!("page{}-img{}", page.page_number, image.image_number);
            let mut node = Node::new(&image_id, NodeType::Image, format!("Image: {stem}"))
                .with_content(format!("{stem}.{:?}", image.format).to_lowercase())
                .with_position(Position {
                    page: page.page_number,
                    start: 0,
                    end: 0,
                });
            if let Some(ocr) = &image.ocr_text {
                node.set_meta("ocrText", ocr);
                reference_sources.push((image_id.clone(), ocr.clone()));
            }
            node.set_meta("storageId", &image.storage_id);
            graph.add_node(node)?;
            graph.add_edge(contains(&page_id, &image_id))?;
        }
    }

    // Reference detection (§4.4 step 7): run after all nodes exist so
    // target resolution can see tables/images/sections.
    for (source_id, content) in &reference_sources {
        let detected = detect_references(content);
        materialize_reference_edges(&mut graph, source_id, &detected);
    }

    let stats = graph.stats();
    graph.set_node_metadata(&doc_id, "stats", &stats);
    graph.set_node_metadata(&doc_id, "status", "complete");

    graph.validate()?;
    Ok(graph)
}

fn table_index(table: &DetectedTable) -> String {
    table
        .number
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("{:x}", fxhash(&table.raw_text)))
}

fn fxhash(s: &str) -> u32 {
    s.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

fn document_node(doc_id: &str, metadata: &DocumentMetadata) -> Node {
    let label = metadata
        .title
        .clone()
        .or_else(|| metadata.filename.clone())
        .unwrap_or_else(|| "Untitled Document".to_string());
    let mut node = Node::new(doc_id, NodeType::Document, label);
    if let Some(author) = &metadata.author {
        node.set_meta("author", author);
    }
    node.set_meta("pageCount", metadata.page_count);
    node
}

fn contains(source: &str, target: &str) -> Edge {
    Edge {
        source: source.to_string(),
        target: target.to_string(),
        edge_type: EdgeType::Contains,
        weight: 1.0,
        metadata: Default::default(),
    }
}

fn label_for(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or(content);
    if first_line.len() > 60 {
        format!("{}…", &first_line[..60])
    } else {
        first_line.to_string()
    }
}

fn median(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Section-detection heuristic (§4.4 step 4): short, title-case/all-caps,
/// no sentence terminator, and longer than the page's median paragraph
/// length (our proxy for "greater than surrounding median height", since
/// this engine works from extracted text, not glyph metrics).
fn looks_like_heading(content: &str, median_len: f64) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed.len() > HEADING_MAX_LEN {
        return false;
    }
    if trimmed.contains(['.', '!', '?']) {
        return false;
    }
    let is_title_or_caps = trimmed
        .split_whitespace()
        .all(|word| word.chars().next().map(|c| c.is_uppercase()).unwrap_or(true))
        || trimmed.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase());

    is_title_or_caps && (trimmed.len() as f64) < median_len.max(1.0) * 1.5
}

/// Lines that appear among the first/last three lines of a page on at
/// least `HEADER_FOOTER_THRESHOLD` of all pages (SPEC_FULL §11).
fn detect_running_lines(parsed: &ParsedDocument) -> std::collections::HashSet<String> {
    use std::collections::HashMap;

    let mut counts: HashMap<String, usize> = HashMap::new();
    let total_pages = parsed.pages.len().max(1);

    for page in &parsed.pages {
        let lines: Vec<&str> = page.raw_text.lines().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
        let mut candidates = std::collections::HashSet::new();
        candidates.extend(lines.iter().take(3).copied());
        if lines.len() > 3 {
            candidates.extend(lines.iter().rev().take(3).copied());
        }
        for candidate in candidates {
            *counts.entry(candidate.to_string()).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count as f64 / total_pages as f64 >= HEADER_FOOTER_THRESHOLD)
        .map(|(line, _)| line)
        .collect()
}

fn is_running_line(content: &str, running_lines: &std::collections::HashSet<String>) -> bool {
    let trimmed = content.trim();
    running_lines.contains(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{ParsedPage, Paragraph};

    fn sample_parsed() -> ParsedDocument {
        ParsedDocument {
            metadata: DocumentMetadata {
                title: Some("Sample".to_string()),
                page_count: 1,
                ..Default::default()
            },
            full_text: "Intro paragraph here with enough text to count.".to_string(),
            pages: vec![ParsedPage {
                page_number: 1,
                raw_text: "Intro paragraph here with enough text to count.".to_string(),
                paragraphs: vec![Paragraph {
                    id: "p1-0".to_string(),
                    page: 1,
                    start: 0,
                    end: 48,
                    content: "Intro paragraph here with enough text to count.".to_string(),
                    confidence: 0.9,
                }],
            }],
        }
    }

    #[test]
    fn builds_valid_graph_with_document_root() {
        let parsed = sample_parsed();
        let input = BuildInput {
            parsed: &parsed,
            tables: &[],
            images: &[],
        };
        let graph = build_graph(&input).unwrap();
        assert!(graph.validate().is_ok());
        assert_eq!(graph.nodes_of_type(NodeType::Document).len(), 1);
    }

    #[test]
    fn empty_page_synthesizes_fallback_paragraph() {
        let mut parsed = sample_parsed();
        parsed.pages[0].paragraphs.clear();
        parsed.pages[0].raw_text = "some content without blank line splits".to_string();
        let input = BuildInput {
            parsed: &parsed,
            tables: &[],
            images: &[],
        };
        let graph = build_graph(&input).unwrap();
        assert!(!graph.nodes_of_type(NodeType::Paragraph).is_empty());
    }

    #[test]
    fn empty_document_still_produces_root_node() {
        let parsed = ParsedDocument {
            metadata: DocumentMetadata::default(),
            full_text: String::new(),
            pages: vec![],
        };
        let input = BuildInput {
            parsed: &parsed,
            tables: &[],
            images: &[],
        };
        let graph = build_graph(&input).unwrap();
        assert_eq!(graph.nodes_of_type(NodeType::Document).len(), 1);
    }
}
