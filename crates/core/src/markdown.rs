//! Markdown export convenience (SPEC_FULL §11): a read-only flattened view
//! of a completed document's graph and summary. Bypasses `DocumentStore`
//! entirely — callers already have the `Document` in hand and just want a
//! shareable rendering.

use crate::document::Document;
use crate::graph::{DocumentGraph, NodeType};

/// Renders `document`'s summary (if any) followed by its graph's sections
/// and paragraphs in reading order. Returns `None` if the document has no
/// graph yet (nothing to flatten).
pub fn export_markdown(document: &Document) -> Option<String> {
    let graph = document.graph.as_ref()?;
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", document.filename));

    if let Some(summary) = &document.summary {
        out.push_str("## Summary\n\n");
        out.push_str(summary.trim());
        out.push_str("\n\n");
    }

    out.push_str(&render_graph_body(graph));
    Some(out.trim_end().to_string() + "\n")
}

fn render_graph_body(graph: &DocumentGraph) -> String {
    let mut out = String::new();
    let mut pages: Vec<_> = graph.nodes_of_type(NodeType::Metadata);
    pages.sort_by_key(|n| n.position.page);

    for page in pages {
        let mut children = graph.children_of(&page.id);
        children.sort_by_key(|n| n.position.start);

        for node in children {
            match node.node_type {
                NodeType::Section | NodeType::Heading => {
                    out.push_str(&format!("## {}\n\n", node.label));
                }
                NodeType::Paragraph => {
                    out.push_str(node.content.trim());
                    out.push_str("\n\n");
                }
                NodeType::Table => {
                    out.push_str(&format!("**{}**\n\n```\n{}\n```\n\n", node.label, node.content.trim()));
                }
                NodeType::List => {
                    for line in node.content.lines() {
                        out.push_str(&format!("- {}\n", line.trim()));
                    }
                    out.push('\n');
                }
                NodeType::Code => {
                    out.push_str(&format!("```\n{}\n```\n\n", node.content.trim()));
                }
                NodeType::Image => {
                    out.push_str(&format!("![{}]({})\n\n", node.label, node.id));
                }
                NodeType::Document | NodeType::Metadata => {}
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentStatus;
    use crate::graph::BuildInput;
    use crate::pdf::{DocumentMetadata, ParsedDocument, ParsedPage, Paragraph};

    fn sample_document() -> Document {
        let parsed = ParsedDocument {
            metadata: DocumentMetadata { title: Some("Report".to_string()), page_count: 1, ..Default::default() },
            full_text: "The quarterly results improved significantly this period.".to_string(),
            pages: vec![ParsedPage {
                page_number: 1,
                raw_text: "The quarterly results improved significantly this period.".to_string(),
                paragraphs: vec![Paragraph {
                    id: "p1-0".to_string(),
                    page: 1,
                    start: 0,
                    end: 58,
                    content: "The quarterly results improved significantly this period.".to_string(),
                    confidence: 0.9,
                }],
            }],
        };
        let graph = crate::graph::build_graph(&BuildInput { parsed: &parsed, tables: &[], images: &[] }).unwrap();

        let mut doc = Document::new("d1", "report.pdf", 1024, "file:///tmp/report.pdf");
        doc.status = DocumentStatus::Completed;
        doc.graph = Some(graph);
        doc.summary = Some("Results improved this quarter.".to_string());
        doc
    }

    #[test]
    fn exports_summary_and_paragraph_content() {
        let doc = sample_document();
        let markdown = export_markdown(&doc).unwrap();
        assert!(markdown.contains("# report.pdf"));
        assert!(markdown.contains("Results improved this quarter."));
        assert!(markdown.contains("quarterly results improved"));
    }

    #[test]
    fn returns_none_without_a_graph() {
        let doc = Document::new("d2", "f.pdf", 10, "s3://x");
        assert!(export_markdown(&doc).is_none());
    }
}
