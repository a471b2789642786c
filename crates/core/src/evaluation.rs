//! Evaluation Service (§4.9): four RAGAS-family LLM-judge metrics plus five
//! custom structural metrics, computed concurrently over the
//! (originalText, summary, graph) triple, combined into a weighted overall
//! score. Never propagates an error — a subsystem failure degrades to a
//! neutral "manual review required" result (§4.9 failure mode).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::graph::{DocumentGraph, Edge, Node, NodeType};
use crate::provider::{LLMRequest, Message, ProviderManager, TEXT_REQUEST_TIMEOUT};
use crate::retry::with_timeout;

const CONTEXT_RECALL_WINDOW: usize = 4000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvaluationThresholds {
    pub overall: f64,
    pub faithfulness: f64,
    pub grounding: f64,
    pub coverage: f64,
}

impl Default for EvaluationThresholds {
    fn default() -> Self {
        Self {
            overall: 0.7,
            faithfulness: 0.8,
            grounding: 0.8,
            coverage: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub faithfulness: f64,
    pub answer_relevancy: f64,
    pub context_recall: f64,
    pub context_precision: f64,
    pub grounding_score: f64,
    pub coverage_score: f64,
    pub graph_utilization: f64,
    pub table_accuracy: f64,
    pub reference_accuracy: f64,
    pub overall_score: f64,
    pub passed: bool,
    #[serde(default)]
    pub recommendation: Option<String>,
}

pub struct EvaluationService<'a> {
    manager: &'a ProviderManager,
    thresholds: EvaluationThresholds,
}

impl<'a> EvaluationService<'a> {
    pub fn new(manager: &'a ProviderManager, thresholds: EvaluationThresholds) -> Self {
        Self { manager, thresholds }
    }

    /// Runs the full §4.9 pipeline. Always returns `Ok`; a judge-call or
    /// internal failure degrades to [`EvaluationService::failed_result`]
    /// rather than propagating.
    pub async fn evaluate(&self, original_text: &str, summary: &str, graph: &DocumentGraph) -> EvaluationResult {
        match self.evaluate_inner(original_text, summary, graph).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "evaluation subsystem failed, returning neutral result");
                Self::failed_result()
            }
        }
    }

    fn failed_result() -> EvaluationResult {
        EvaluationResult {
            recommendation: Some("manual review required".to_string()),
            passed: false,
            ..Default::default()
        }
    }

    async fn evaluate_inner(
        &self,
        original_text: &str,
        summary: &str,
        graph: &DocumentGraph,
    ) -> crate::error::CoreResult<EvaluationResult> {
        let truncated_source = truncate_chars(original_text, CONTEXT_RECALL_WINDOW);

        let (faithfulness, answer_relevancy, context_recall, context_precision) = tokio::join!(
            self.judge_faithfulness(original_text, summary),
            self.judge_answer_relevancy(summary),
            self.judge_context_recall(&truncated_source, summary),
            self.judge_context_precision(original_text, summary),
        );

        let grounding_score = grounding_score(summary);
        let coverage_score = coverage_score(summary, graph);
        let graph_utilization = graph_utilization(summary, graph);
        let table_accuracy = table_accuracy(summary, graph);
        let reference_accuracy = reference_accuracy(summary);

        let overall_score = (0.25 * faithfulness
            + 0.15 * answer_relevancy
            + 0.15 * context_recall
            + 0.15 * context_precision
            + 0.15 * grounding_score
            + 0.10 * coverage_score
            + 0.03 * graph_utilization
            + 0.01 * table_accuracy
            + 0.01 * reference_accuracy)
            .clamp(0.0, 1.0);

        let passed = overall_score >= self.thresholds.overall
            && faithfulness >= self.thresholds.faithfulness
            && grounding_score >= self.thresholds.grounding
            && coverage_score >= self.thresholds.coverage;

        Ok(EvaluationResult {
            faithfulness,
            answer_relevancy,
            context_recall,
            context_precision,
            grounding_score,
            coverage_score,
            graph_utilization,
            table_accuracy,
            reference_accuracy,
            overall_score,
            passed,
            recommendation: if passed { None } else { Some("manual review required".to_string()) },
        })
    }

    async fn judge(&self, instruction: &str) -> f64 {
        let request = LLMRequest {
            messages: vec![
                Message::system(
                    "You are a strict evaluation judge. Respond with only a single decimal \
                     number between 0 and 1, nothing else."
                        .to_string(),
                ),
                Message::user(instruction.to_string()),
            ],
            max_tokens: Some(50),
            temperature: Some(0.1),
            top_p: None,
            model: None,
        };

        match with_timeout(TEXT_REQUEST_TIMEOUT, self.manager.generate_text(&request)).await {
            Ok(response) => parse_judge_score(&response.content).unwrap_or_else(|| {
                tracing::warn!(raw = %response.content, "judge output did not parse as a score, defaulting to neutral");
                0.5
            }),
            Err(e) => {
                tracing::warn!(error = %e, "judge call failed, defaulting to neutral score");
                0.5
            }
        }
    }

    async fn judge_faithfulness(&self, source: &str, summary: &str) -> f64 {
        self.judge(&format!(
            "Source:\n{source}\n\nSummary:\n{summary}\n\n\
             Score the fraction of statements in the summary that are directly supported by the source."
        ))
        .await
    }

    async fn judge_answer_relevancy(&self, summary: &str) -> f64 {
        self.judge(&format!(
            "Summary:\n{summary}\n\n\
             Score how useful this summary would be for answering likely questions about the document."
        ))
        .await
    }

    async fn judge_context_recall(&self, truncated_source: &str, summary: &str) -> f64 {
        self.judge(&format!(
            "Source (leading excerpt):\n{truncated_source}\n\nSummary:\n{summary}\n\n\
             Score how much of the source's important content is covered by the summary."
        ))
        .await
    }

    async fn judge_context_precision(&self, source: &str, summary: &str) -> f64 {
        self.judge(&format!(
            "Source:\n{source}\n\nSummary:\n{summary}\n\n\
             Score the fraction of the summary that is actually supported by the source (precision, not recall)."
        ))
        .await
    }
}

fn parse_judge_score(raw: &str) -> Option<f64> {
    static RE_SCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d*\.?\d+)").unwrap());
    let captured = RE_SCORE.captures(raw.trim())?;
    let value: f64 = captured.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(0.0, 1.0))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

static RE_GROUNDING: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\[Node:\d+\]").unwrap(),
        Regex::new(r"\[p\.\d+\]").unwrap(),
        Regex::new(r"(?i)\(see (Table|Figure|Section) \d+\)").unwrap(),
        Regex::new(r"(?i)Section \d+(\.\d+)*").unwrap(),
    ]
});

fn split_statements(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(|s| s.trim())
        .filter(|s| s.len() > 10)
        .collect()
}

/// `groundingScore` (§4.9): fraction of summary statements containing at
/// least one grounding citation pattern.
fn grounding_score(summary: &str) -> f64 {
    let statements = split_statements(summary);
    if statements.is_empty() {
        return 1.0;
    }
    let grounded = statements
        .iter()
        .filter(|s| RE_GROUNDING.iter().any(|re| re.is_match(s)))
        .count();
    grounded as f64 / statements.len() as f64
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(|w| w.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn important_nodes(graph: &DocumentGraph) -> Vec<&Node> {
    graph
        .nodes()
        .filter(|n| {
            matches!(n.node_type, NodeType::Heading | NodeType::Table | NodeType::Image)
                || (n.node_type == NodeType::Paragraph && n.content.len() > 200)
        })
        .collect()
}

fn is_covered(summary_tokens: &HashSet<String>, node: &Node) -> bool {
    let node_tokens = tokenize(&node.content);
    jaccard(summary_tokens, &node_tokens) > 0.2
}

/// `coverageScore` (§4.9): fraction of "important" nodes with substantial
/// word-overlap with the summary.
fn coverage_score(summary: &str, graph: &DocumentGraph) -> f64 {
    let important = important_nodes(graph);
    if important.is_empty() {
        return 1.0;
    }
    let summary_tokens = tokenize(summary);
    let covered = important.iter().filter(|n| is_covered(&summary_tokens, n)).count();
    covered as f64 / important.len() as f64
}

/// `graphUtilization` (§4.9): fraction of edges whose both endpoints are
/// "covered" by the same Jaccard-overlap definition used by
/// [`coverage_score`]. This reuses the "important node" coverage signal as
/// a proxy for edge relevance — a weak signal documented here rather than
/// a precise graph-traversal utilization measure (SPEC_FULL §12).
fn graph_utilization(summary: &str, graph: &DocumentGraph) -> f64 {
    let edges: Vec<&Edge> = graph.edges().collect();
    if edges.is_empty() {
        return 1.0;
    }
    let summary_tokens = tokenize(summary);
    let covered_nodes: HashSet<&str> = graph
        .nodes()
        .filter(|n| is_covered(&summary_tokens, n))
        .map(|n| n.id.as_str())
        .collect();

    let covered_edges = edges
        .iter()
        .filter(|e| covered_nodes.contains(e.source.as_str()) && covered_nodes.contains(e.target.as_str()))
        .count();
    covered_edges as f64 / edges.len() as f64
}

static RE_TABLE_FIGURE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(Table|Figure)\s+(\d+)\b").unwrap());

/// `tableAccuracy` (§4.9): for each `Table N`/`Figure N` mention in the
/// summary, 1 if a matching table/image node exists, else 0.
fn table_accuracy(summary: &str, graph: &DocumentGraph) -> f64 {
    let refs: Vec<_> = RE_TABLE_FIGURE_REF.captures_iter(summary).collect();
    if refs.is_empty() {
        return 1.0;
    }
    let correct = refs
        .iter()
        .filter(|caps| {
            let kind = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            let number = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let node_type = if kind == "table" { NodeType::Table } else { NodeType::Image };
            graph.nodes_of_type(node_type).into_iter().any(|n| {
                n.metadata
                    .get("number")
                    .and_then(|v| v.as_str())
                    .map(|s| s == number)
                    .unwrap_or(false)
                    || n.content.contains(number)
            })
        })
        .count();
    correct as f64 / refs.len() as f64
}

static RE_SECTION_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSection\s+\d+(\.\d+)*\b").unwrap());
static RE_PAGE_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(?:page|p\.)\s+\d+\b").unwrap());
static RE_INVALID_SECTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSection\s*$").unwrap());

/// `referenceAccuracy` (§4.9): validates `Section X[.Y]` / `page N` / `p. N`
/// format only, with no cross-check against the graph.
fn reference_accuracy(summary: &str) -> f64 {
    let section_refs = RE_SECTION_REF.find_iter(summary).count();
    let page_refs = RE_PAGE_REF.find_iter(summary).count();
    let malformed = RE_INVALID_SECTION.find_iter(summary).count();
    let total = section_refs + page_refs + malformed;
    if total == 0 {
        return 1.0;
    }
    (section_refs + page_refs) as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreferredProvider;
    use crate::error::CoreResult;
    use crate::graph::EdgeType;
    use crate::provider::{LLMProvider, LLMResponse, TokenUsage};
    use async_trait::async_trait;

    struct StubJudge;

    #[async_trait]
    impl LLMProvider for StubJudge {
        fn name(&self) -> &str {
            "stub-judge"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn supported_models(&self) -> &[String] {
            &[]
        }
        async fn generate_text(&self, _request: &LLMRequest) -> CoreResult<LLMResponse> {
            Ok(LLMResponse {
                content: "0.9".to_string(),
                model: "stub".to_string(),
                provider: "stub-judge".to_string(),
                tokens: TokenUsage::default(),
                cost: 0.0,
                processing_time_ms: 1,
            })
        }
        async fn analyze_image(&self, request: &LLMRequest) -> CoreResult<LLMResponse> {
            self.generate_text(request).await
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    fn graph_with_table_and_section() -> DocumentGraph {
        let mut g = DocumentGraph::new();
        g.add_node(Node::new("doc-1", NodeType::Document, "Doc")).unwrap();
        let mut section = Node::new("sec-2", NodeType::Heading, "Section 2");
        section.content = "Section 2 defines the method.".to_string();
        g.add_node(section).unwrap();
        g.add_edge(Edge {
            source: "doc-1".to_string(),
            target: "sec-2".to_string(),
            edge_type: EdgeType::Contains,
            weight: 1.0,
            metadata: Default::default(),
        })
        .unwrap();

        let mut table = Node::new("table-1", NodeType::Table, "Table 1");
        table.content = "Sales by quarter".to_string();
        table.set_meta("number", "1");
        g.add_node(table).unwrap();
        g.add_edge(Edge {
            source: "doc-1".to_string(),
            target: "table-1".to_string(),
            edge_type: EdgeType::Contains,
            weight: 1.0,
            metadata: Default::default(),
        })
        .unwrap();
        g
    }

    #[test]
    fn grounding_score_is_perfect_for_fully_cited_summary() {
        let summary = "The sales grew 20% (see Table 1). Section 2 defines the method.";
        assert!((grounding_score(summary) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn table_accuracy_matches_existing_table_number() {
        let graph = graph_with_table_and_section();
        let summary = "The sales grew 20% (see Table 1). Section 2 defines the method.";
        assert!((table_accuracy(summary, &graph) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reference_accuracy_scores_well_formed_references() {
        let summary = "See Section 2 and page 5 for details.";
        assert!((reference_accuracy(summary) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn coverage_score_is_one_when_no_important_nodes() {
        let mut g = DocumentGraph::new();
        g.add_node(Node::new("doc-1", NodeType::Document, "Doc")).unwrap();
        assert_eq!(coverage_score("anything", &g), 1.0);
    }

    #[tokio::test]
    async fn evaluate_never_fails_and_scores_within_bounds() {
        let manager = ProviderManager::new(vec![Box::new(StubJudge)], PreferredProvider::Auto, true);
        let service = EvaluationService::new(&manager, EvaluationThresholds::default());
        let graph = graph_with_table_and_section();
        let result = service
            .evaluate(
                "Full source document text about sales and methodology.",
                "The sales grew 20% (see Table 1). Section 2 defines the method.",
                &graph,
            )
            .await;
        assert!((0.0..=1.0).contains(&result.overall_score));
        assert!((0.0..=1.0).contains(&result.faithfulness));
    }
}
