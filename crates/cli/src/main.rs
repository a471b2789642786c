use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docgraph_core::provider::google::GoogleProvider;
use docgraph_core::provider::openai::OpenAiProvider;
use docgraph_core::prompts::{PromptStyle, SummaryType};
use docgraph_core::{
    Document, DocumentOrchestrator, DocumentStore, EngineConfig, LLMProvider, ProcessRequest,
    ProgressBus, ProgressEvent, ProviderManager, SummaryOptions,
};
use docgraph_storage::{ensure_root, InMemoryDocumentStore, LocalObjectStorage};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

/// Document Graph Engine CLI — exercises the orchestrator end to end
/// against local files.
#[derive(Parser)]
#[command(name = "docgraph", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one PDF through the full pipeline and print the outcome.
    Process(ProcessArgs),
    /// Serve the progress-bus WebSocket wiring over HTTP.
    Serve(ServeArgs),
}

#[derive(clap::Args)]
struct ProcessArgs {
    /// Path to the input PDF.
    input: PathBuf,

    /// Directory rasterized images and summaries get written under.
    #[arg(short, long, default_value = "./data")]
    output: PathBuf,

    /// Preferred summary type, if --summarize is set.
    #[arg(long, default_value = "executive")]
    summary_type: String,

    /// Request a summary after graph build.
    #[arg(long)]
    summarize: bool,

    /// Run RAGAS-family + structural evaluation after summarization.
    #[arg(long)]
    evaluate: bool,

    /// Skip page image extraction.
    #[arg(long)]
    no_images: bool,

    /// Max summary length in words.
    #[arg(long, default_value_t = 500)]
    max_length: u32,
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Address to bind the WebSocket wiring to.
    #[arg(long, default_value = "127.0.0.1:8899")]
    bind: String,
}

fn parse_summary_type(value: &str) -> SummaryType {
    match value.to_ascii_lowercase().as_str() {
        "detailed" => SummaryType::Detailed,
        "chapter" => SummaryType::Chapter,
        "bullet-points" | "bulletpoints" => SummaryType::BulletPoints,
        "narrative" => SummaryType::Narrative,
        "technical" => SummaryType::Technical,
        _ => SummaryType::Executive,
    }
}

fn build_provider_manager(config: &EngineConfig) -> ProviderManager {
    let providers: Vec<Box<dyn LLMProvider>> = vec![
        Box::new(OpenAiProvider::new()),
        Box::new(GoogleProvider::new()),
    ];
    ProviderManager::new(providers, config.preferred_provider, config.fallback_enabled)
}

/// Renders Progress Bus events to a terminal progress bar, the way the
/// teacher's CLI drives `indicatif` off its own progress reporter.
async fn watch_progress(bus: Arc<ProgressBus>, document_id: String) {
    let Ok(mut rx) = bus.subscribe(&document_id).await else {
        return;
    };
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    while let Ok(message) = rx.recv().await {
        match message.event {
            ProgressEvent::Progress { percent, message, .. } => {
                bar.set_position(percent as u64);
                bar.set_message(message);
            }
            ProgressEvent::SummaryComplete { .. } => {
                bar.finish_with_message("done");
                break;
            }
            ProgressEvent::Error { message, .. } => {
                bar.abandon_with_message(format!("error: {message}"));
                break;
            }
            ProgressEvent::ConnectionEstablished { .. } => {}
        }
    }
}

async fn run_process(args: ProcessArgs) -> Result<()> {
    let filename = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());
    let byte_size = tokio::fs::metadata(&args.input)
        .await
        .context("reading input file metadata")?
        .len();

    let mut config = EngineConfig::from_env();
    config.storage_base_dir = args.output.join("uploads").to_string_lossy().to_string();
    config.output_image_dir = args.output.join("images").to_string_lossy().to_string();
    ensure_root(std::path::Path::new(&config.storage_base_dir)).await.ok();
    ensure_root(std::path::Path::new(&config.output_image_dir)).await.ok();

    let document_id = uuid::Uuid::new_v4().to_string();
    let document_store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let object_storage = Arc::new(LocalObjectStorage::new(config.output_image_dir.clone()));
    let progress_bus = Arc::new(ProgressBus::new(
        config.progress_max_subscribers,
        std::time::Duration::from_secs(config.progress_heartbeat_secs),
        std::time::Duration::from_secs(config.progress_connection_timeout_secs),
    ));
    let provider_manager = Arc::new(build_provider_manager(&config));

    document_store
        .create(Document::new(
            document_id.clone(),
            filename.clone(),
            byte_size,
            args.input.to_string_lossy().to_string(),
        ))
        .await?;

    let watcher = tokio::spawn(watch_progress(progress_bus.clone(), document_id.clone()));

    let orchestrator = DocumentOrchestrator::new(
        config.clone(),
        provider_manager,
        progress_bus,
        document_store.clone(),
        object_storage,
    )?;

    let request = ProcessRequest {
        document_id: document_id.clone(),
        file_path: args.input.clone(),
        filename,
        image_options: Default::default(),
        extract_images: !args.no_images,
        summarize: args.summarize.then(|| SummaryOptions {
            summary_type: parse_summary_type(&args.summary_type),
            max_length: args.max_length,
            focus_terms: Vec::new(),
            exclude_terms: Vec::new(),
            style: PromptStyle::default(),
            model: None,
            provider: None,
        }),
        evaluate: args.evaluate,
        cancellation: CancellationToken::new(),
    };

    let outcome = orchestrator.process(request).await?;
    let _ = watcher.await;

    println!("status: {:?}", outcome.status);
    if let Some(summary) = &outcome.summary {
        println!("\n--- summary ({:?}) ---\n{}", summary.summary_type, summary.summary);
    }
    if let Some(evaluation) = &outcome.evaluation {
        println!(
            "\n--- evaluation ---\noverall: {:.2} (pass: {})",
            evaluation.overall_score, evaluation.passed
        );
    }

    if let Some(document) = document_store.get(&document_id, None).await? {
        if let Some(graph) = &document.graph {
            let stats = graph.stats();
            println!("\ngraph: {} nodes, {} edges", stats.total_nodes, stats.total_edges);
        }
    }

    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let progress_bus = Arc::new(ProgressBus::new(
        16,
        std::time::Duration::from_secs(15),
        std::time::Duration::from_secs(30),
    ));
    let state = docgraph_server::AppState::new(progress_bus.clone());
    let app = docgraph_server::create_app(state);

    let maintenance_bus = progress_bus.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(15));
        loop {
            interval.tick().await;
            maintenance_bus.run_maintenance().await;
        }
    });

    tracing::info!(bind = %args.bind, "serving progress-bus wiring");
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Process(args) => run_process(args).await,
        Commands::Serve(args) => run_serve(args).await,
    }
}
