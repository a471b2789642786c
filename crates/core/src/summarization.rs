//! Summarization Service (§4.8): validates options, builds a prompt from a
//! graph, dispatches through the Manager, and returns a result ready for
//! the caller to persist via `DocumentStore::store_summary`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::graph::{DocumentGraph, GraphStats};
use crate::prompts::{build_prompt, estimate_tokens, PromptOptions, SummaryType};
use crate::provider::{LLMRequest, Message, ProviderManager, TokenUsage, TEXT_REQUEST_TIMEOUT};
use crate::quota::{infer_purpose, QuotaManager};
use crate::retry::{with_retry, with_timeout};

const MIN_MAX_LENGTH: u32 = 50;
const MAX_MAX_LENGTH: u32 = 5000;
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOptions {
    #[serde(rename = "type")]
    pub summary_type: SummaryType,
    pub max_length: u32,
    #[serde(default)]
    pub focus_terms: Vec<String>,
    #[serde(default)]
    pub exclude_terms: Vec<String>,
    #[serde(default)]
    pub style: crate::prompts::PromptStyle,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl SummaryOptions {
    /// Rejects a `maxLength` outside `[50, 5000]` (§4.8, §8 boundary case:
    /// 50 accepted, 49 rejected).
    fn validate(&self) -> CoreResult<()> {
        if self.max_length < MIN_MAX_LENGTH || self.max_length > MAX_MAX_LENGTH {
            return Err(CoreError::InvalidOption(format!(
                "max_length must be between {MIN_MAX_LENGTH} and {MAX_MAX_LENGTH}, got {}",
                self.max_length
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    #[serde(rename = "type")]
    pub summary_type: SummaryType,
    pub model: String,
    pub provider: String,
    pub tokens: TokenUsage,
    pub cost: f64,
    pub processing_time_ms: u64,
    pub graph_stats: GraphStats,
}

pub struct SummarizationService<'a> {
    manager: &'a ProviderManager,
    quota: Option<&'a QuotaManager>,
}

impl<'a> SummarizationService<'a> {
    pub fn new(manager: &'a ProviderManager) -> Self {
        Self { manager, quota: None }
    }

    /// Enables purpose-based model routing through the Quota Manager (§4.7):
    /// an explicit `options.model` always wins, but when the caller leaves
    /// it unset this picks a model by inferred task purpose and records
    /// usage against it once the call succeeds.
    pub fn with_quota(manager: &'a ProviderManager, quota: &'a QuotaManager) -> Self {
        Self { manager, quota: Some(quota) }
    }

    /// Runs the §4.8 pipeline for one summary type.
    pub async fn summarize(&self, graph: &DocumentGraph, options: &SummaryOptions) -> CoreResult<SummaryResult> {
        options.validate()?;

        let prompt_options = PromptOptions {
            style: options.style,
            max_length: options.max_length,
        };
        let template = build_prompt(options.summary_type, graph, &prompt_options);

        let mut user_prompt = template.user_prompt;
        if !options.focus_terms.is_empty() {
            user_prompt.push_str(&format!("\nFocus on: {}.", options.focus_terms.join(", ")));
        }
        if !options.exclude_terms.is_empty() {
            user_prompt.push_str(&format!("\nExclude: {}.", options.exclude_terms.join(", ")));
        }

        let messages = vec![
            Message::system(template.system_prompt),
            Message::user(user_prompt),
        ];

        let model = match (&options.model, self.quota) {
            (Some(explicit), _) => Some(explicit.clone()),
            (None, Some(quota)) => {
                let purpose = infer_purpose(&messages);
                let estimated_tokens = estimate_tokens(&template.context) as u64;
                Some(quota.select_model(purpose, estimated_tokens)?)
            }
            (None, None) => None,
        };

        let request = LLMRequest {
            messages,
            max_tokens: Some(estimate_tokens_for_words(options.max_length)),
            temperature: Some(0.3),
            top_p: None,
            model: model.clone(),
        };

        let response = with_retry(RETRY_ATTEMPTS, RETRY_DELAY, || {
            with_timeout(TEXT_REQUEST_TIMEOUT, self.manager.generate_text(&request))
        })
        .await?;

        if let Some(quota) = self.quota {
            // Record against the model the Quota Manager gated (`model`),
            // not whatever the provider reports it actually used — the
            // per-model RPD cap (§4.7) is enforced against the selected
            // model's counter, so that counter is the one that must move.
            let recorded_model = model.as_deref().unwrap_or(&response.model);
            quota.record_usage(recorded_model, response.tokens.total as u64);
        }

        Ok(SummaryResult {
            summary: response.content,
            summary_type: options.summary_type,
            model: response.model,
            provider: response.provider,
            tokens: response.tokens,
            cost: response.cost,
            processing_time_ms: response.processing_time_ms,
            graph_stats: graph.stats(),
        })
    }

    /// Processes `types` sequentially to avoid parallel quota contention
    /// (§4.8): aborts on the first failure and surfaces it, no partial
    /// success.
    pub async fn summarize_multiple(
        &self,
        graph: &DocumentGraph,
        types: &[SummaryType],
        base_options: &SummaryOptions,
    ) -> CoreResult<Vec<SummaryResult>> {
        let mut results = Vec::with_capacity(types.len());
        for &summary_type in types {
            let options = SummaryOptions {
                summary_type,
                ..base_options.clone()
            };
            results.push(self.summarize(graph, &options).await?);
        }
        Ok(results)
    }
}

fn estimate_tokens_for_words(max_words: u32) -> u32 {
    // Rough words→tokens ratio consistent with the engine's `estimate_tokens`
    // (≈4 chars/token, ≈5.5 chars/word including the trailing space).
    ((max_words as f64) * 1.4).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreferredProvider;
    use crate::graph::{Edge, EdgeType, Node, NodeType, Position};
    use crate::provider::{LLMProvider, LLMResponse};
    use async_trait::async_trait;

    struct StubProvider;

    #[async_trait]
    impl LLMProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn supported_models(&self) -> &[String] {
            &[]
        }
        async fn generate_text(&self, _request: &LLMRequest) -> CoreResult<LLMResponse> {
            Ok(LLMResponse {
                content: "A concise summary.".to_string(),
                model: "stub-model".to_string(),
                provider: "stub".to_string(),
                tokens: TokenUsage { prompt: 10, completion: 5, total: 15 },
                cost: 0.001,
                processing_time_ms: 5,
            })
        }
        async fn analyze_image(&self, request: &LLMRequest) -> CoreResult<LLMResponse> {
            self.generate_text(request).await
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    fn sample_graph() -> DocumentGraph {
        let mut g = DocumentGraph::new();
        g.add_node(Node::new("doc-1", NodeType::Document, "Doc")).unwrap();
        let mut para = Node::new("p1", NodeType::Paragraph, "p").with_content("Some important finding.");
        para.position = Position { page: 1, start: 0, end: 10 };
        g.add_node(para).unwrap();
        g.add_edge(Edge {
            source: "doc-1".to_string(),
            target: "p1".to_string(),
            edge_type: EdgeType::Contains,
            weight: 1.0,
            metadata: Default::default(),
        })
        .unwrap();
        g
    }

    #[tokio::test]
    async fn rejects_max_length_below_minimum() {
        let manager = ProviderManager::new(vec![Box::new(StubProvider)], PreferredProvider::Auto, true);
        let service = SummarizationService::new(&manager);
        let options = SummaryOptions {
            summary_type: SummaryType::Executive,
            max_length: 49,
            focus_terms: vec![],
            exclude_terms: vec![],
            style: Default::default(),
            model: None,
            provider: None,
        };
        let err = service.summarize(&sample_graph(), &options).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidOption(_)));
    }

    #[tokio::test]
    async fn accepts_minimum_boundary_value() {
        let manager = ProviderManager::new(vec![Box::new(StubProvider)], PreferredProvider::Auto, true);
        let service = SummarizationService::new(&manager);
        let options = SummaryOptions {
            summary_type: SummaryType::Executive,
            max_length: 50,
            focus_terms: vec![],
            exclude_terms: vec![],
            style: Default::default(),
            model: None,
            provider: None,
        };
        let result = service.summarize(&sample_graph(), &options).await.unwrap();
        assert_eq!(result.summary, "A concise summary.");
        assert_eq!(result.provider, "stub");
    }

    #[tokio::test]
    async fn summarize_multiple_runs_sequentially() {
        let manager = ProviderManager::new(vec![Box::new(StubProvider)], PreferredProvider::Auto, true);
        let service = SummarizationService::new(&manager);
        let base = SummaryOptions {
            summary_type: SummaryType::Executive,
            max_length: 100,
            focus_terms: vec![],
            exclude_terms: vec![],
            style: Default::default(),
            model: None,
            provider: None,
        };
        let results = service
            .summarize_multiple(&sample_graph(), &[SummaryType::Executive, SummaryType::BulletPoints], &base)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn quota_routing_selects_model_and_records_usage() {
        use crate::quota::{QuotaLimits, QuotaManager};

        let manager = ProviderManager::new(vec![Box::new(StubProvider)], PreferredProvider::Auto, true);
        let quota = QuotaManager::new(vec![(
            "exp-fast-model".to_string(),
            QuotaLimits { rpm: 60, tpm: 100_000, rpd: 10 },
        )]);
        let service = SummarizationService::with_quota(&manager, &quota);
        let options = SummaryOptions {
            summary_type: SummaryType::Executive,
            max_length: 100,
            focus_terms: vec![],
            exclude_terms: vec![],
            style: Default::default(),
            model: None,
            provider: None,
        };

        service.summarize(&sample_graph(), &options).await.unwrap();

        let snapshot = quota.snapshot("exp-fast-model").unwrap();
        assert_eq!(snapshot.usage.requests_today, 1);
    }
}
