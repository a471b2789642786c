use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the document graph engine.
///
/// Each variant is a distinct taxonomy entry with a machine-readable kind
/// (the variant itself) and an HTTP-style status hint for the surrounding
/// API layer, which this crate does not own but documents via
/// [`CoreError::status_hint`].
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid PDF: {0}")]
    InvalidPdf(String),

    #[error("encrypted PDF is not supported")]
    UnsupportedEncryptedPdf,

    #[error("image extraction aborted after {consecutive_failures} consecutive failures")]
    ImageExtractionAborted { consecutive_failures: u32 },

    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    #[error("no LLM providers available")]
    NoProvidersAvailable,

    #[error("provider '{0}' unavailable")]
    ProviderUnavailable(String),

    #[error("invalid API key for provider '{0}'")]
    InvalidApiKey(String),

    #[error("rate limit exceeded for provider '{0}'")]
    RateLimitExceeded(String),

    #[error("quota exhausted for model '{model}', resets at {next_reset_time}")]
    QuotaExhausted {
        model: String,
        next_reset_time: chrono::DateTime<chrono::Utc>,
    },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("task cancelled: {0}")]
    Cancelled(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("graph error: {0}")]
    Graph(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("pdfium error: {0}")]
    Pdfium(String),

    #[error("progress bus capacity reached: {0}")]
    ProgressBusCapacity(String),
}

/// A coarse HTTP-style status hint, used only by the (out-of-scope) API
/// layer surrounding this engine. The engine itself never returns HTTP
/// statuses; this exists so that collaborator shows how to map kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusHint {
    BadRequest,
    Unauthorized,
    NotFound,
    Unprocessable,
    TooManyRequests,
    ServiceUnavailable,
    Internal,
}

impl CoreError {
    pub fn status_hint(&self) -> StatusHint {
        match self {
            CoreError::InvalidPdf(_) | CoreError::InvalidOption(_) => StatusHint::BadRequest,
            CoreError::UnsupportedEncryptedPdf => StatusHint::Unprocessable,
            CoreError::InvalidApiKey(_) => StatusHint::Unauthorized,
            CoreError::RateLimitExceeded(_) | CoreError::QuotaExhausted { .. } => {
                StatusHint::TooManyRequests
            }
            CoreError::NoProvidersAvailable | CoreError::ProviderUnavailable(_) => {
                StatusHint::ServiceUnavailable
            }
            CoreError::ProgressBusCapacity(_) => StatusHint::ServiceUnavailable,
            CoreError::ImageExtractionAborted { .. }
            | CoreError::OcrUnavailable(_)
            | CoreError::EvaluationFailed(_)
            | CoreError::Cancelled(_)
            | CoreError::Timeout(_)
            | CoreError::Graph(_)
            | CoreError::Image(_)
            | CoreError::Provider(_)
            | CoreError::Io(_)
            | CoreError::Serde(_)
            | CoreError::Config(_)
            | CoreError::Pdfium(_) => StatusHint::Internal,
        }
    }

    /// Whether this error kind is eligible for the Manager's one-shot
    /// fallback retry against an alternate provider (§4.6, §7).
    pub fn is_fallback_eligible(&self) -> bool {
        !matches!(
            self,
            CoreError::QuotaExhausted { .. } | CoreError::InvalidApiKey(_)
        )
    }
}
