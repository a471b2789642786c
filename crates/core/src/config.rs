use serde::{Deserialize, Serialize};

/// Which concrete LLM provider the manager should prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferredProvider {
    /// OpenAI-family chat/completions provider.
    RemoteA,
    /// Google-family content-generation provider.
    RemoteB,
    /// First available provider in preference order.
    Auto,
}

impl Default for PreferredProvider {
    fn default() -> Self {
        Self::Auto
    }
}

/// Engine-wide configuration, loaded once from the environment at startup
/// and passed explicitly to the components that need it (§5, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base directory for locally stored uploads and rendered images.
    pub storage_base_dir: String,

    /// Output directory for rasterized page/figure images.
    pub output_image_dir: String,

    /// Enable OCR on extracted images (default: false).
    #[serde(default)]
    pub ocr_enabled: bool,

    /// OCR language code passed to the `tesseract` binary (default: "eng").
    #[serde(default = "default_ocr_lang")]
    pub ocr_language: String,

    /// Whether the Quota Manager enforces per-model daily limits (default: true).
    #[serde(default = "default_true")]
    pub quota_enabled: bool,

    /// Soft daily token budget, advisory only (§4.7).
    #[serde(default)]
    pub daily_token_budget: Option<u64>,

    /// Preferred LLM provider.
    #[serde(default)]
    pub preferred_provider: PreferredProvider,

    /// Whether the manager may fall back to an alternate provider on error.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,

    /// Number of documents the orchestrator processes concurrently.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Maximum subscribers per document on the Progress Bus.
    #[serde(default = "default_max_subscribers")]
    pub progress_max_subscribers: usize,

    /// Heartbeat interval for Progress Bus subscribers, in seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub progress_heartbeat_secs: u64,

    /// Idle timeout before a Progress Bus subscriber is closed, in seconds.
    #[serde(default = "default_connection_timeout_secs")]
    pub progress_connection_timeout_secs: u64,

    /// Overall wall-clock budget for one document's full pipeline (§5).
    #[serde(default = "default_document_timeout_secs")]
    pub document_timeout_secs: u64,
}

fn default_ocr_lang() -> String {
    "eng".to_string()
}

fn default_true() -> bool {
    true
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_max_subscribers() -> usize {
    16
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_connection_timeout_secs() -> u64 {
    30
}

fn default_document_timeout_secs() -> u64 {
    600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_base_dir: "./data/uploads".to_string(),
            output_image_dir: "./data/images".to_string(),
            ocr_enabled: false,
            ocr_language: default_ocr_lang(),
            quota_enabled: true,
            daily_token_budget: None,
            preferred_provider: PreferredProvider::default(),
            fallback_enabled: true,
            worker_pool_size: default_worker_pool_size(),
            progress_max_subscribers: default_max_subscribers(),
            progress_heartbeat_secs: default_heartbeat_secs(),
            progress_connection_timeout_secs: default_connection_timeout_secs(),
            document_timeout_secs: default_document_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// [`EngineConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_base_dir: std::env::var("DOCGRAPH_STORAGE_DIR")
                .unwrap_or(defaults.storage_base_dir),
            output_image_dir: std::env::var("DOCGRAPH_IMAGE_DIR")
                .unwrap_or(defaults.output_image_dir),
            ocr_enabled: env_bool("DOCGRAPH_OCR_ENABLED", defaults.ocr_enabled),
            ocr_language: std::env::var("DOCGRAPH_OCR_LANG").unwrap_or(defaults.ocr_language),
            quota_enabled: env_bool("DOCGRAPH_QUOTA_ENABLED", defaults.quota_enabled),
            daily_token_budget: std::env::var("DOCGRAPH_DAILY_TOKEN_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok()),
            preferred_provider: std::env::var("DOCGRAPH_PREFERRED_PROVIDER")
                .ok()
                .and_then(|v| match v.to_lowercase().as_str() {
                    "remote-a" | "openai" => Some(PreferredProvider::RemoteA),
                    "remote-b" | "google" => Some(PreferredProvider::RemoteB),
                    "auto" => Some(PreferredProvider::Auto),
                    _ => None,
                })
                .unwrap_or(defaults.preferred_provider),
            fallback_enabled: env_bool("DOCGRAPH_FALLBACK_ENABLED", defaults.fallback_enabled),
            worker_pool_size: env_usize("DOCGRAPH_WORKER_POOL_SIZE", defaults.worker_pool_size),
            progress_max_subscribers: env_usize(
                "DOCGRAPH_PROGRESS_MAX_SUBSCRIBERS",
                defaults.progress_max_subscribers,
            ),
            progress_heartbeat_secs: std::env::var("DOCGRAPH_PROGRESS_HEARTBEAT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.progress_heartbeat_secs),
            progress_connection_timeout_secs: std::env::var("DOCGRAPH_PROGRESS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.progress_connection_timeout_secs),
            document_timeout_secs: std::env::var("DOCGRAPH_DOCUMENT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.document_timeout_secs),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Options for rasterizing PDF pages to images (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageExtractionOptions {
    /// Pages to rasterize; `None` means all pages.
    #[serde(default)]
    pub pages: Option<Vec<u32>>,

    /// Render resolution, clamped with a warning outside 72-600.
    #[serde(default = "default_dpi")]
    pub dpi: u32,

    #[serde(default)]
    pub format: ImageFormat,

    /// Encoder quality for lossy formats, 1-100.
    #[serde(default = "default_quality")]
    pub quality: u8,

    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

fn default_dpi() -> u32 {
    150
}

fn default_quality() -> u8 {
    90
}

impl Default for ImageExtractionOptions {
    fn default() -> Self {
        Self {
            pages: None,
            dpi: default_dpi(),
            format: ImageFormat::default(),
            quality: default_quality(),
            max_width: None,
            max_height: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Tiff,
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self::Png
    }
}
