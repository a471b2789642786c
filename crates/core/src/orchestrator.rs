//! Document Orchestrator (§4.11): drives one uploaded document through
//! PARSING → IMAGE_EXTRACTION (non-fatal) → GRAPH_BUILD → persist →
//! optional SUMMARIZATION → EVALUATION, emitting progress and honoring the
//! worker-pool/cancellation/timeout model of §5.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::document::DocumentStatus;
use crate::error::{CoreError, CoreResult};
use crate::evaluation::{EvaluationResult, EvaluationService, EvaluationThresholds};
use crate::graph::{build_graph, BuildInput, DocumentGraph};
use crate::image_extractor::{ExtractedImage, ImageExtractor, ImageSink};
use crate::object_storage::{NameStrategy, ObjectStorage, SaveOptions};
use crate::pdf::PdfParser;
use crate::progress::{ProgressBus, ProgressEvent, Stage};
use crate::provider::ProviderManager;
use crate::store::DocumentStore;
use crate::summarization::{SummarizationService, SummaryOptions, SummaryResult};

/// Adapts `ObjectStorage` (§6) to the narrower `ImageSink` contract the
/// image extraction stage calls, the same narrowing relationship
/// `image_extractor::NullImageSink` documents for tests.
struct ObjectStorageSink {
    storage: Arc<dyn ObjectStorage>,
}

#[async_trait::async_trait]
impl ImageSink for ObjectStorageSink {
    async fn store(&self, page_number: u32, image_number: u32, bytes: &[u8]) -> CoreResult<String> {
        let file_name = format!("page-{page_number}-img-{image_number}.png");
        let saved = self
            .storage
            .save(bytes, &file_name, &SaveOptions { create_subdirs: true, name_strategy: NameStrategy::Original })
            .await?;
        Ok(saved.path)
    }
}

/// Per-document processing request.
pub struct ProcessRequest {
    pub document_id: String,
    pub file_path: std::path::PathBuf,
    pub filename: String,
    pub image_options: crate::config::ImageExtractionOptions,
    pub extract_images: bool,
    pub summarize: Option<SummaryOptions>,
    pub evaluate: bool,
    pub cancellation: CancellationToken,
}

/// Result of the optional summarization/evaluation step, distinguishing
/// "never asked for a summary" from "asked, and it failed" (§4.11): both
/// leave `summary`/`evaluation` empty, but only the latter must *not*
/// advance the document to `Completed` or emit `summary_complete`.
enum SummarizationOutcome {
    NotRequested,
    Failed,
    Done(SummaryResult, Option<EvaluationResult>),
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub document_id: String,
    pub status: DocumentStatus,
    pub summary: Option<SummaryResult>,
    pub evaluation: Option<EvaluationResult>,
}

pub struct DocumentOrchestrator {
    config: EngineConfig,
    pdf_parser: PdfParser,
    provider_manager: Arc<ProviderManager>,
    progress_bus: Arc<ProgressBus>,
    document_store: Arc<dyn DocumentStore>,
    object_storage: Arc<dyn ObjectStorage>,
    worker_slots: Arc<Semaphore>,
}

impl DocumentOrchestrator {
    pub fn new(
        config: EngineConfig,
        provider_manager: Arc<ProviderManager>,
        progress_bus: Arc<ProgressBus>,
        document_store: Arc<dyn DocumentStore>,
        object_storage: Arc<dyn ObjectStorage>,
    ) -> CoreResult<Self> {
        let worker_slots = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        let pdf_parser = PdfParser::new()?;
        Ok(Self {
            config,
            pdf_parser,
            provider_manager,
            progress_bus,
            document_store,
            object_storage,
            worker_slots,
        })
    }

    /// Runs the full pipeline for one document. Bounded by the configured
    /// worker pool (§5): callers beyond `worker_pool_size` concurrent
    /// documents wait for a free slot here rather than at the caller.
    /// Never returns `Err` for pipeline-stage failures — those are
    /// reflected in `ProcessOutcome::status` and persisted via
    /// `DocumentStore`/`ProgressBus`, per §4.11's per-stage failure table.
    pub async fn process(&self, request: ProcessRequest) -> CoreResult<ProcessOutcome> {
        let _permit = self.worker_slots.acquire().await.map_err(|_| CoreError::Cancelled(request.document_id.clone()))?;

        let timeout = Duration::from_secs(self.config.document_timeout_secs);
        match tokio::time::timeout(timeout, self.run_pipeline(&request)).await {
            Ok(result) => result,
            Err(_) => {
                let reason = format!("document task exceeded {:?}", timeout);
                self.fail(&request.document_id, &reason).await;
                Ok(ProcessOutcome {
                    document_id: request.document_id.clone(),
                    status: DocumentStatus::Failed,
                    summary: None,
                    evaluation: None,
                })
            }
        }
    }

    async fn run_pipeline(&self, request: &ProcessRequest) -> CoreResult<ProcessOutcome> {
        if request.cancellation.is_cancelled() {
            return Ok(self.cancel(&request.document_id).await);
        }

        self.document_store.update_status(&request.document_id, DocumentStatus::Processing, None).await?;

        self.emit(&request.document_id, Stage::Parsing, 0.0, "Parsing PDF").await;
        let bytes = match tokio::fs::read(&request.file_path).await {
            Ok(b) => b,
            Err(e) => {
                self.fail_parsing(&request.document_id, &CoreError::Io(e)).await;
                return Ok(self.outcome_failed(&request.document_id));
            }
        };

        let parsed = match self.pdf_parser.parse(&bytes, Some(&request.filename)) {
            Ok(p) => p,
            Err(e) => {
                self.fail_parsing(&request.document_id, &e).await;
                return Ok(self.outcome_failed(&request.document_id));
            }
        };
        self.emit(&request.document_id, Stage::Parsing, 1.0, "Parsing complete").await;

        if request.cancellation.is_cancelled() {
            return Ok(self.cancel(&request.document_id).await);
        }

        let images = if request.extract_images {
            self.emit(&request.document_id, Stage::ImageExtraction, 0.0, "Extracting images").await;
            let extracted = self.extract_images(&bytes, &request.image_options).await;
            self.emit(&request.document_id, Stage::ImageExtraction, 1.0, "Image extraction complete").await;
            extracted
        } else {
            Vec::new()
        };

        if request.cancellation.is_cancelled() {
            return Ok(self.cancel(&request.document_id).await);
        }

        self.emit(&request.document_id, Stage::GraphBuild, 0.0, "Building graph").await;
        let graph = match build_graph(&BuildInput { parsed: &parsed, tables: &[], images: &images }) {
            Ok(g) => g,
            Err(e) => {
                self.fail(&request.document_id, &e.to_string()).await;
                self.emit_error(&request.document_id, "Graph", &e.to_string(), Some(Stage::GraphBuild)).await;
                return Ok(self.outcome_failed(&request.document_id));
            }
        };
        self.emit(&request.document_id, Stage::GraphBuild, 1.0, "Graph build complete").await;

        self.document_store.store_graph(&request.document_id, graph.clone()).await?;

        // Summarization failure (§4.11) must leave the document's status
        // as `Processing` (set above) and emit only the `error` event
        // already published inside `maybe_summarize_and_evaluate` — never
        // advance to `Completed` or publish `summary_complete`.
        let outcome = self.maybe_summarize_and_evaluate(request, &graph).await?;
        if matches!(outcome, SummarizationOutcome::Failed) {
            return Ok(ProcessOutcome {
                document_id: request.document_id.clone(),
                status: DocumentStatus::Processing,
                summary: None,
                evaluation: None,
            });
        }
        let (summary, evaluation) = match outcome {
            SummarizationOutcome::NotRequested => (None, None),
            SummarizationOutcome::Done(summary, evaluation) => (Some(summary), evaluation),
            SummarizationOutcome::Failed => unreachable!("handled above"),
        };

        self.document_store.update_status(&request.document_id, DocumentStatus::Completed, None).await?;
        self.emit(&request.document_id, Stage::Complete, 1.0, "Processing complete").await;

        let summary_payload = summary.as_ref().map(|s| json!({ "summary": s.summary, "type": s.summary_type }));
        self.progress_bus
            .publish(
                &request.document_id,
                ProgressEvent::SummaryComplete {
                    summary_payload: summary_payload.unwrap_or(serde_json::Value::Null),
                    evaluation_payload: evaluation.as_ref().and_then(|e| serde_json::to_value(e).ok()),
                },
            )
            .await
            .ok();

        Ok(ProcessOutcome {
            document_id: request.document_id.clone(),
            status: DocumentStatus::Completed,
            summary,
            evaluation,
        })
    }

    async fn maybe_summarize_and_evaluate(
        &self,
        request: &ProcessRequest,
        graph: &DocumentGraph,
    ) -> CoreResult<SummarizationOutcome> {
        let Some(options) = &request.summarize else {
            return Ok(SummarizationOutcome::NotRequested);
        };

        self.emit(&request.document_id, Stage::Summarization, 0.0, "Summarizing").await;
        let summarizer = SummarizationService::new(&self.provider_manager);
        let summary = match summarizer.summarize(graph, options).await {
            Ok(result) => result,
            Err(e) => {
                // Summarization failure (§4.11): status unchanged, summary
                // not stored, emit error, skip evaluation entirely.
                self.emit_error(&request.document_id, "Summarization", &e.to_string(), Some(Stage::Summarization))
                    .await;
                return Ok(SummarizationOutcome::Failed);
            }
        };
        self.document_store.store_summary(&request.document_id, &summary.summary).await?;
        self.emit(&request.document_id, Stage::Summarization, 1.0, "Summarization complete").await;

        if !request.evaluate {
            return Ok(SummarizationOutcome::Done(summary, None));
        }

        self.emit(&request.document_id, Stage::Evaluation, 0.0, "Evaluating").await;
        let evaluator = EvaluationService::new(&self.provider_manager, EvaluationThresholds::default());
        let evaluation = evaluator.evaluate(&graph_text(graph), &summary.summary, graph).await;
        self.emit(&request.document_id, Stage::Evaluation, 1.0, "Evaluation complete").await;

        Ok(SummarizationOutcome::Done(summary, Some(evaluation)))
    }

    async fn extract_images(&self, bytes: &[u8], options: &crate::config::ImageExtractionOptions) -> Vec<ExtractedImage> {
        let document = match self.pdf_parser.open(bytes) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "image extraction could not reopen document, continuing with no images");
                return Vec::new();
            }
        };

        let sink = ObjectStorageSink { storage: self.object_storage.clone() };
        let mut extractor = ImageExtractor::new(self.config.ocr_language.clone());
        match extractor.extract(&document, options, &sink, self.config.ocr_enabled).await {
            Ok(images) => images,
            Err(e) => {
                // Non-fatal (§4.11): log and continue with an empty image set.
                tracing::warn!(error = %e, "image extraction failed, continuing with no images");
                Vec::new()
            }
        }
    }

    async fn emit(&self, document_id: &str, stage: Stage, stage_progress: f64, message: &str) {
        let percent = stage.global_percent(stage_progress);
        let _ = self
            .progress_bus
            .publish(
                document_id,
                ProgressEvent::Progress { stage, percent, message: message.to_string(), metadata: Default::default() },
            )
            .await;
    }

    async fn emit_error(&self, document_id: &str, code: &str, message: &str, stage: Option<Stage>) {
        let _ = self
            .progress_bus
            .publish(document_id, ProgressEvent::Error { code: code.to_string(), message: message.to_string(), stage })
            .await;
    }

    async fn fail_parsing(&self, document_id: &str, error: &CoreError) {
        let code = match error {
            CoreError::UnsupportedEncryptedPdf => "UnsupportedEncryptedPDF",
            CoreError::InvalidPdf(_) => "InvalidPDF",
            _ => "InvalidPDF",
        };
        self.fail(document_id, &error.to_string()).await;
        self.emit_error(document_id, code, &error.to_string(), Some(Stage::Parsing)).await;
    }

    async fn fail(&self, document_id: &str, reason: &str) {
        let _ = self.document_store.update_status(document_id, DocumentStatus::Failed, Some(reason)).await;
    }

    async fn cancel(&self, document_id: &str) -> ProcessOutcome {
        self.fail(document_id, "cancelled").await;
        self.emit_error(document_id, "Cancelled", "task cancelled", None).await;
        self.progress_bus.unsubscribe(document_id).await;
        ProcessOutcome { document_id: document_id.to_string(), status: DocumentStatus::Failed, summary: None, evaluation: None }
    }

    fn outcome_failed(&self, document_id: &str) -> ProcessOutcome {
        ProcessOutcome { document_id: document_id.to_string(), status: DocumentStatus::Failed, summary: None, evaluation: None }
    }
}

/// Flattens a graph's textual nodes back into a single string for the
/// evaluator's `originalText` input, since the orchestrator only keeps the
/// built graph (not the raw parsed pages) past the Graph Build stage.
fn graph_text(graph: &DocumentGraph) -> String {
    let mut nodes: Vec<_> = graph.nodes().filter(|n| !n.content.is_empty()).collect();
    nodes.sort_by_key(|n| (n.position.page, n.position.start));
    nodes.into_iter().map(|n| n.content.as_str()).collect::<Vec<_>>().join("\n")
}
