//! Deterministic prompt construction from a graph subset (§4.5).

use serde::{Deserialize, Serialize};

use crate::graph::{DocumentGraph, Node, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryType {
    Executive,
    Detailed,
    Chapter,
    BulletPoints,
    Narrative,
    Technical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    Formal,
    Casual,
    Technical,
}

impl Default for PromptStyle {
    fn default() -> Self {
        Self::Formal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOptions {
    pub style: PromptStyle,
    pub max_length: u32,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            style: PromptStyle::Formal,
            max_length: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub system_prompt: String,
    pub user_prompt: String,
    pub context: String,
    pub instructions: String,
}

const KEY_KEYWORDS: [&str; 13] = [
    "summary",
    "conclusion",
    "introduction",
    "overview",
    "key",
    "important",
    "main",
    "primary",
    "significant",
    "recommendation",
    "finding",
    "result",
    "outcome",
];
const KEY_LENGTH_THRESHOLD: usize = 200;
const ADDITIONAL_CONTENT_LABEL: &str = "Additional Content";

/// Selects the node set each summary type prescribes (§4.5).
fn select_nodes<'a>(summary_type: SummaryType, graph: &'a DocumentGraph) -> Vec<&'a Node> {
    match summary_type {
        SummaryType::Executive => graph
            .nodes()
            .filter(|n| n.node_type == NodeType::Section || is_key_paragraph(n))
            .collect(),
        SummaryType::Detailed => graph
            .nodes()
            .filter(|n| {
                matches!(
                    n.node_type,
                    NodeType::Section | NodeType::Paragraph | NodeType::Table | NodeType::List
                )
            })
            .collect(),
        SummaryType::Chapter => graph
            .nodes()
            .filter(|n| matches!(n.node_type, NodeType::Section | NodeType::Paragraph))
            .collect(),
        SummaryType::BulletPoints => graph
            .nodes()
            .filter(|n| matches!(n.node_type, NodeType::Section | NodeType::Paragraph | NodeType::List))
            .collect(),
        SummaryType::Narrative => {
            let mut nodes: Vec<&Node> = graph
                .nodes()
                .filter(|n| matches!(n.node_type, NodeType::Section | NodeType::Paragraph))
                .collect();
            nodes.sort_by_key(|n| (n.position.page, n.position.start));
            nodes
        }
        SummaryType::Technical => graph
            .nodes()
            .filter(|n| {
                matches!(
                    n.node_type,
                    NodeType::Section | NodeType::Paragraph | NodeType::Table | NodeType::Code | NodeType::List
                )
            })
            .collect(),
    }
}

fn is_key_paragraph(node: &Node) -> bool {
    if node.node_type != NodeType::Paragraph {
        return false;
    }
    let lowercase = node.content.to_lowercase();
    KEY_KEYWORDS.iter().any(|kw| lowercase.contains(kw)) || node.content.len() > KEY_LENGTH_THRESHOLD
}

/// Groups paragraphs under their parent section (walking `contains`
/// upward, stopping at the first `section` ancestor); orphans fall under a
/// trailing "Additional Content" block (§4.5).
fn assemble_context(graph: &DocumentGraph, nodes: &[&Node]) -> String {
    use std::collections::BTreeMap;

    let mut grouped: BTreeMap<String, Vec<&Node>> = BTreeMap::new();
    let mut section_order: Vec<String> = Vec::new();

    for node in nodes {
        if node.node_type == NodeType::Section {
            continue;
        }
        let section_label = graph
            .find_parent_of_type(&node.id, NodeType::Section)
            .map(|s| s.label.clone())
            .unwrap_or_else(|| ADDITIONAL_CONTENT_LABEL.to_string());
        if !grouped.contains_key(&section_label) {
            section_order.push(section_label.clone());
        }
        grouped.entry(section_label).or_default().push(node);
    }

    // Section nodes with no children still get a heading line.
    for node in nodes.iter().filter(|n| n.node_type == NodeType::Section) {
        grouped.entry(node.label.clone()).or_default();
        if !section_order.contains(&node.label) {
            section_order.push(node.label.clone());
        }
    }

    section_order.sort();
    if let Some(pos) = section_order.iter().position(|s| s == ADDITIONAL_CONTENT_LABEL) {
        let label = section_order.remove(pos);
        section_order.push(label);
    }

    let mut out = String::new();
    for section in &section_order {
        out.push_str(&format!("## {section}\n\n"));
        if let Some(children) = grouped.get(section) {
            for child in children {
                out.push_str(child.content.trim());
                out.push_str("\n\n");
            }
        }
    }
    out.trim_end().to_string()
}

fn system_prompt_for(summary_type: SummaryType, style: PromptStyle) -> String {
    let voice = match style {
        PromptStyle::Formal => "Write in a formal, objective register.",
        PromptStyle::Casual => "Write in a conversational, approachable tone.",
        PromptStyle::Technical => "Write precisely, preserving technical terminology.",
    };
    let task = match summary_type {
        SummaryType::Executive => "Produce a concise executive summary highlighting key findings and recommendations.",
        SummaryType::Detailed => "Produce a detailed summary covering sections, tables, and lists.",
        SummaryType::Chapter => "Produce a chapter-by-chapter summary grouped by section.",
        SummaryType::BulletPoints => "Produce a bullet-point summary of the key content.",
        SummaryType::Narrative => "Produce a narrative summary following the document's natural reading order.",
        SummaryType::Technical => "Produce a technical summary preserving data from tables and code blocks.",
    };
    format!("You are a document summarization assistant. {task} {voice}")
}

fn instructions_for(summary_type: SummaryType) -> String {
    format!(
        "Ground every claim in the provided context. Cite sections, tables, or figures by name. \
         Summary type: {summary_type:?}."
    )
}

/// Pure function `(SummaryType, DocumentGraph, opts) → PromptTemplate`
/// (§4.5). Deterministic: identical inputs produce an identical template.
pub fn build_prompt(
    summary_type: SummaryType,
    graph: &DocumentGraph,
    options: &PromptOptions,
) -> PromptTemplate {
    let nodes = select_nodes(summary_type, graph);
    let context = assemble_context(graph, &nodes);
    let system_prompt = system_prompt_for(summary_type, options.style);
    let instructions = instructions_for(summary_type);

    let user_prompt = format!(
        "{context}\n\n---\nMaximum length: {max_length} words.",
        context = context,
        max_length = options.max_length,
    );

    PromptTemplate {
        system_prompt,
        user_prompt,
        context,
        instructions,
    }
}

/// Authoritative token estimator used throughout the engine (§4.5):
/// `ceil(len(text) / 4)`.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, EdgeType, Position};

    fn sample_graph() -> DocumentGraph {
        let mut g = DocumentGraph::new();
        g.add_node(Node::new("doc-1", NodeType::Document, "Doc")).unwrap();
        g.add_node(Node::new("sec-1", NodeType::Section, "Introduction")).unwrap();
        g.add_edge(Edge {
            source: "doc-1".to_string(),
            target: "sec-1".to_string(),
            edge_type: EdgeType::Contains,
            weight: 1.0,
            metadata: Default::default(),
        })
        .unwrap();
        let mut para = Node::new("p1", NodeType::Paragraph, "p")
            .with_content("This is a key finding worth noting in the summary.");
        para.position = Position { page: 1, start: 0, end: 10 };
        g.add_node(para).unwrap();
        g.add_edge(Edge {
            source: "sec-1".to_string(),
            target: "p1".to_string(),
            edge_type: EdgeType::Contains,
            weight: 1.0,
            metadata: Default::default(),
        })
        .unwrap();
        g
    }

    #[test]
    fn prompt_generation_is_deterministic() {
        let graph = sample_graph();
        let opts = PromptOptions::default();
        let a = build_prompt(SummaryType::Executive, &graph, &opts);
        let b = build_prompt(SummaryType::Executive, &graph, &opts);
        assert_eq!(a.system_prompt, b.system_prompt);
        assert_eq!(a.user_prompt, b.user_prompt);
        assert_eq!(a.instructions, b.instructions);
    }

    #[test]
    fn context_groups_paragraph_under_section() {
        let graph = sample_graph();
        let opts = PromptOptions::default();
        let template = build_prompt(SummaryType::Executive, &graph, &opts);
        assert!(template.context.contains("Introduction"));
        assert!(template.context.contains("key finding"));
    }

    #[test]
    fn token_estimate_is_ceiling_division_by_four() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
