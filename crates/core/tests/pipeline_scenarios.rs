//! Cross-module integration scenarios (§8 of the spec). These exercise the
//! Graph Builder, Summarization, Evaluation, Quota Manager, and Provider
//! Manager together against fake LLM providers, the way the teacher's own
//! integration tests drive `processor.rs` against a fake `LLMProvider`
//! rather than a real network call. PDF parsing itself is out of scope
//! here (it needs a real pdfium binary); these tests start from a
//! hand-built `ParsedDocument`, which is exactly what `PdfParser::parse`
//! would have produced for the documents described in each scenario.

use async_trait::async_trait;
use docgraph_core::config::PreferredProvider;
use docgraph_core::error::CoreError;
use docgraph_core::evaluation::{EvaluationService, EvaluationThresholds};
use docgraph_core::graph::{build_graph, BuildInput};
use docgraph_core::pdf::{DocumentMetadata, Paragraph, ParsedDocument, ParsedPage};
use docgraph_core::provider::{LLMProvider, LLMRequest, LLMResponse, ProviderManager, TokenUsage};
use docgraph_core::quota::{QuotaLimits, QuotaManager};
use docgraph_core::summarization::{SummarizationService, SummaryOptions};
use docgraph_core::prompts::{PromptStyle, SummaryType};

/// A fake provider that always answers with a fixed response, the fakes
/// this crate's own unit tests already use for `ProviderManager`.
struct FakeProvider {
    name: &'static str,
    model: &'static str,
    content: &'static str,
    fail: bool,
}

#[async_trait]
impl LLMProvider for FakeProvider {
    fn name(&self) -> &str {
        self.name
    }
    fn is_available(&self) -> bool {
        true
    }
    fn supported_models(&self) -> &[String] {
        &[]
    }
    async fn generate_text(&self, _request: &LLMRequest) -> Result<LLMResponse, CoreError> {
        if self.fail {
            return Err(CoreError::ProviderUnavailable(self.name.to_string()));
        }
        Ok(LLMResponse {
            content: self.content.to_string(),
            model: self.model.to_string(),
            provider: self.name.to_string(),
            tokens: TokenUsage { prompt: 120, completion: 40, total: 160 },
            cost: 0.002,
            processing_time_ms: 12,
        })
    }
    async fn analyze_image(&self, request: &LLMRequest) -> Result<LLMResponse, CoreError> {
        self.generate_text(request).await
    }
    async fn health_check(&self) -> bool {
        !self.fail
    }
}

/// Builds the 3-page, 2-paragraphs-per-page parsed document used by
/// scenario 1 of §8.
fn three_page_document() -> ParsedDocument {
    let mut pages = Vec::new();
    for page_number in 1..=3u32 {
        let paragraphs = vec![
            Paragraph {
                id: format!("p{page_number}-0"),
                page: page_number,
                start: 0,
                end: 60,
                content: format!(
                    "This is the first paragraph on page {page_number}. It discusses the key finding."
                ),
                confidence: 0.9,
            },
            Paragraph {
                id: format!("p{page_number}-1"),
                page: page_number,
                start: 61,
                end: 130,
                content: format!(
                    "This is the second paragraph on page {page_number}, continuing the discussion."
                ),
                confidence: 0.9,
            },
        ];
        let raw_text = paragraphs
            .iter()
            .map(|p| p.content.clone())
            .collect::<Vec<_>>()
            .join("\n\n");
        pages.push(ParsedPage { page_number, raw_text, paragraphs });
    }
    let full_text = pages.iter().map(|p| p.raw_text.clone()).collect::<Vec<_>>().join("\n");
    ParsedDocument {
        metadata: DocumentMetadata { page_count: 3, ..Default::default() },
        pages,
        full_text,
    }
}

fn summary_options(summary_type: SummaryType, max_length: u32) -> SummaryOptions {
    SummaryOptions {
        summary_type,
        max_length,
        focus_terms: vec![],
        exclude_terms: vec![],
        style: PromptStyle::Formal,
        model: None,
        provider: None,
    }
}

/// Scenario 1 (§8): a valid 3-page, 2-paragraphs-per-page PDF, no
/// tables/images, summarized as `executive` with `maxLength = 200`.
#[tokio::test]
async fn three_page_document_builds_graph_summarizes_and_evaluates() {
    let parsed = three_page_document();
    let graph = build_graph(&BuildInput { parsed: &parsed, tables: &[], images: &[] }).unwrap();

    let contains_count = graph
        .edges()
        .filter(|e| e.edge_type == docgraph_core::graph::EdgeType::Contains)
        .count();
    let follows_count = graph
        .edges()
        .filter(|e| e.edge_type == docgraph_core::graph::EdgeType::Follows)
        .count();
    assert_eq!(contains_count, 3 + 6, "3 pages + 6 paragraphs under `contains`");
    assert_eq!(follows_count, 3, "one `follows` edge per page joining its two paragraphs");
    assert_eq!(graph.nodes().filter(|n| n.node_type == docgraph_core::graph::NodeType::Document).count(), 1);

    let provider = ProviderManager::new(
        vec![Box::new(FakeProvider {
            name: "remote-a",
            model: "standard-fast-model",
            content: "The document covers three pages of related findings.",
            fail: false,
        })],
        PreferredProvider::Auto,
        true,
    );
    let summarizer = SummarizationService::new(&provider);
    let options = summary_options(SummaryType::Executive, 200);
    let summary = summarizer.summarize(&graph, &options).await.unwrap();
    assert!(!summary.summary.is_empty());

    let evaluator = EvaluationService::new(&provider, EvaluationThresholds::default());
    let result = evaluator.evaluate(&parsed.full_text, &summary.summary, &graph).await;
    assert!((0.0..=1.0).contains(&result.overall_score));
    assert!((0.0..=1.0).contains(&result.faithfulness));
    assert!((0.0..=1.0).contains(&result.coverage_score));
}

/// Scenario 3 (§8): an `rpd = 1` quota shared by every model and two
/// sequential summarize calls on two different documents — the first
/// succeeds, the second fails with `QuotaExhausted` carrying a future
/// `next_reset_time`.
#[tokio::test]
async fn quota_exhaustion_fails_second_document_with_future_reset() {
    let provider = ProviderManager::new(
        vec![Box::new(FakeProvider {
            name: "remote-a",
            model: "exp-fast-model",
            content: "Short summary.",
            fail: false,
        })],
        PreferredProvider::Auto,
        true,
    );
    // Only one model is known to the Quota Manager here, so that once its
    // single rpd=1 budget is spent there is nothing left for either the
    // quick-summary recommendation order or the last-resort walk over all
    // known models to fall back to (§4.7) — the second call must exhaust.
    let quota = QuotaManager::new(vec![(
        "exp-fast-model".to_string(),
        QuotaLimits { rpm: 60, tpm: 100_000, rpd: 1 },
    )]);
    let summarizer = SummarizationService::with_quota(&provider, &quota);

    let parsed = three_page_document();
    let graph = build_graph(&BuildInput { parsed: &parsed, tables: &[], images: &[] }).unwrap();
    let options = summary_options(SummaryType::Executive, 200);

    let first = summarizer.summarize(&graph, &options).await;
    assert!(first.is_ok(), "first document should succeed against fresh quota");

    let second = summarizer.summarize(&graph, &options).await;
    match second {
        Err(CoreError::QuotaExhausted { next_reset_time, .. }) => {
            assert!(next_reset_time > chrono::Utc::now(), "reset time must be in the future");
        }
        other => panic!("expected QuotaExhausted, got {other:?}"),
    }
}

/// Scenario 4 (§8): provider A fails transiently, provider B succeeds;
/// fallback is enabled; the caller explicitly requested A. One response
/// comes back, attributed to B, and its tokens are recorded under a
/// B-model in the Quota Manager.
#[tokio::test]
async fn fallback_to_second_provider_records_usage_under_its_model() {
    let provider = ProviderManager::new(
        vec![
            Box::new(FakeProvider { name: "remote-a", model: "a-model", content: "unused", fail: true }),
            Box::new(FakeProvider {
                name: "remote-b",
                model: "b-model",
                content: "Fallback summary from provider B.",
                fail: false,
            }),
        ],
        PreferredProvider::RemoteA,
        true,
    );
    let quota = QuotaManager::new(vec![("b-model".to_string(), QuotaLimits { rpm: 60, tpm: 100_000, rpd: 100 })]);
    let summarizer = SummarizationService::with_quota(&provider, &quota);

    let parsed = three_page_document();
    let graph = build_graph(&BuildInput { parsed: &parsed, tables: &[], images: &[] }).unwrap();
    // Explicit model pins the quota lookup to "b-model" directly, since
    // routing-by-purpose would pick from the fixed recommendation tables
    // rather than this test's ad hoc model name; the point under test is
    // the fallback + usage-recording path, not purpose inference.
    let mut options = summary_options(SummaryType::Executive, 200);
    options.model = Some("b-model".to_string());

    let result = summarizer.summarize(&graph, &options).await.unwrap();
    assert_eq!(result.provider, "remote-b");

    let snapshot = quota.snapshot("b-model").unwrap();
    assert_eq!(snapshot.usage.requests_today, 1);
}

/// Scenario 6 (§8): a grounded summary against a graph with a matching
/// table and section scores perfectly on grounding/table/reference
/// accuracy.
#[tokio::test]
async fn grounded_summary_scores_perfect_on_structural_metrics() {
    use docgraph_core::graph::{DocumentGraph, Edge, EdgeType, Node, NodeType, Position};

    let mut graph = DocumentGraph::new();
    graph.add_node(Node::new("doc-1", NodeType::Document, "Doc")).unwrap();

    let mut table = Node::new("t1", NodeType::Table, "Table: 2x2").with_content("Table 1: Sales by quarter");
    table.position = Position { page: 1, start: 0, end: 20 };
    graph.add_node(table).unwrap();
    graph
        .add_edge(Edge { source: "doc-1".into(), target: "t1".into(), edge_type: EdgeType::Contains, weight: 1.0, metadata: Default::default() })
        .unwrap();

    let mut section = Node::new("s1", NodeType::Section, "Section 2").with_content("Section 2: Methodology");
    section.position = Position { page: 1, start: 21, end: 50 };
    graph.add_node(section).unwrap();
    graph
        .add_edge(Edge { source: "doc-1".into(), target: "s1".into(), edge_type: EdgeType::Contains, weight: 1.0, metadata: Default::default() })
        .unwrap();

    let provider = ProviderManager::new(
        vec![Box::new(FakeProvider { name: "remote-a", model: "judge-model", content: "0.9", fail: false })],
        PreferredProvider::Auto,
        true,
    );
    let evaluator = EvaluationService::new(&provider, EvaluationThresholds::default());
    let summary = "The sales grew 20% (see Table 1). Section 2 defines the method.";
    let result = evaluator.evaluate("source text unused here", summary, &graph).await;

    assert_eq!(result.grounding_score, 1.0);
    assert_eq!(result.table_accuracy, 1.0);
    assert_eq!(result.reference_accuracy, 1.0);
}
