//! LLM provider abstraction and the Manager that auto-selects and falls
//! back between providers (§4.6).

pub mod google;
pub mod openai;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PreferredProvider;
use crate::error::{CoreError, CoreResult};

/// Default per-call request timeout for text generation (§5).
pub const TEXT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Default per-call request timeout for vision analysis (§5).
pub const VISION_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContentPart {
    Text(String),
    ImageRef { storage_id: String, mime_type: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::ImageRef { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMRequest {
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub tokens: TokenUsage,
    pub cost: f64,
    pub processing_time_ms: u64,
}

/// Unified provider interface (§4.6). Each concrete provider enforces
/// vision-model requirements for `analyze_image` internally.
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    fn supported_models(&self) -> &[String];
    async fn generate_text(&self, request: &LLMRequest) -> CoreResult<LLMResponse>;
    async fn analyze_image(&self, request: &LLMRequest) -> CoreResult<LLMResponse>;
    async fn health_check(&self) -> bool;
}

/// Holds the ordered set of providers and performs selection/fallback
/// (§4.6).
pub struct ProviderManager {
    providers: Vec<Box<dyn LLMProvider>>,
    preferred: PreferredProvider,
    fallback_enabled: bool,
}

impl ProviderManager {
    pub fn new(
        providers: Vec<Box<dyn LLMProvider>>,
        preferred: PreferredProvider,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            providers,
            preferred,
            fallback_enabled,
        }
    }

    fn available_providers(&self) -> Vec<&dyn LLMProvider> {
        self.providers
            .iter()
            .filter(|p| p.is_available())
            .map(|p| p.as_ref())
            .collect()
    }

    /// Selection policy (§4.6): `auto` picks the first available provider
    /// in preference order; an explicit preference returns it if
    /// available, else falls back (if enabled) to the first available, or
    /// fails.
    pub fn select_provider(&self) -> CoreResult<&dyn LLMProvider> {
        let available = self.available_providers();
        if available.is_empty() {
            return Err(CoreError::NoProvidersAvailable);
        }

        match self.preferred {
            PreferredProvider::Auto => Ok(available[0]),
            PreferredProvider::RemoteA | PreferredProvider::RemoteB => {
                let wanted = self.preferred_name();
                if let Some(p) = available.iter().find(|p| p.name() == wanted) {
                    return Ok(*p);
                }
                if self.fallback_enabled {
                    Ok(available[0])
                } else {
                    Err(CoreError::NoProvidersAvailable)
                }
            }
        }
    }

    fn preferred_name(&self) -> &'static str {
        match self.preferred {
            PreferredProvider::RemoteA => "remote-a",
            PreferredProvider::RemoteB => "remote-b",
            PreferredProvider::Auto => "auto",
        }
    }

    /// Drives a text-generation request through the selected provider,
    /// retrying exactly once against the next available provider on
    /// fallback-eligible errors when the caller didn't request `auto`
    /// (§4.6, §7).
    pub async fn generate_text(&self, request: &LLMRequest) -> CoreResult<LLMResponse> {
        self.dispatch(request, |p, r| Box::pin(p.generate_text(r))).await
    }

    pub async fn analyze_image(&self, request: &LLMRequest) -> CoreResult<LLMResponse> {
        self.dispatch(request, |p, r| Box::pin(p.analyze_image(r))).await
    }

    async fn dispatch<'a, F>(&'a self, request: &LLMRequest, call: F) -> CoreResult<LLMResponse>
    where
        F: for<'b> Fn(
            &'b dyn LLMProvider,
            &'b LLMRequest,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = CoreResult<LLMResponse>> + Send + 'b>>,
    {
        let provider = self.select_provider()?;
        match call(provider, request).await {
            Ok(response) => Ok(response),
            Err(e) if self.fallback_should_retry(&e) => {
                let available = self.available_providers();
                let next = available.into_iter().find(|p| p.name() != provider.name());
                match next {
                    Some(alt) => call(alt, request).await,
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn fallback_should_retry(&self, error: &CoreError) -> bool {
        self.fallback_enabled
            && !matches!(self.preferred, PreferredProvider::Auto)
            && error.is_fallback_eligible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct StubProvider {
        name: &'static str,
        available: bool,
        fail: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl LLMProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn is_available(&self) -> bool {
            self.available
        }
        fn supported_models(&self) -> &[String] {
            &[]
        }
        async fn generate_text(&self, _request: &LLMRequest) -> CoreResult<LLMResponse> {
            if self.fail.load(Ordering::Relaxed) {
                Err(CoreError::ProviderUnavailable(self.name.to_string()))
            } else {
                Ok(LLMResponse {
                    content: format!("from {}", self.name),
                    model: "stub".to_string(),
                    provider: self.name.to_string(),
                    tokens: TokenUsage::default(),
                    cost: 0.0,
                    processing_time_ms: 1,
                })
            }
        }
        async fn analyze_image(&self, request: &LLMRequest) -> CoreResult<LLMResponse> {
            self.generate_text(request).await
        }
        async fn health_check(&self) -> bool {
            self.available
        }
    }

    #[tokio::test]
    async fn auto_selects_first_available() {
        let manager = ProviderManager::new(
            vec![
                Box::new(StubProvider {
                    name: "remote-a",
                    available: true,
                    fail: Arc::new(AtomicBool::new(false)),
                }),
                Box::new(StubProvider {
                    name: "remote-b",
                    available: true,
                    fail: Arc::new(AtomicBool::new(false)),
                }),
            ],
            PreferredProvider::Auto,
            true,
        );
        let p = manager.select_provider().unwrap();
        assert_eq!(p.name(), "remote-a");
    }

    #[tokio::test]
    async fn falls_back_exactly_once_on_provider_error() {
        let failing = Arc::new(AtomicBool::new(true));
        let manager = ProviderManager::new(
            vec![
                Box::new(StubProvider {
                    name: "remote-a",
                    available: true,
                    fail: failing.clone(),
                }),
                Box::new(StubProvider {
                    name: "remote-b",
                    available: true,
                    fail: Arc::new(AtomicBool::new(false)),
                }),
            ],
            PreferredProvider::RemoteA,
            true,
        );
        let response = manager
            .generate_text(&LLMRequest::default())
            .await
            .unwrap();
        assert_eq!(response.provider, "remote-b");
    }

    #[tokio::test]
    async fn no_providers_available_errors() {
        let manager = ProviderManager::new(vec![], PreferredProvider::Auto, true);
        let err = manager.select_provider().unwrap_err();
        assert!(matches!(err, CoreError::NoProvidersAvailable));
    }
}
