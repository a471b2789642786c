use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CoreError, CoreResult};

use super::{ContentPart, LLMProvider, LLMRequest, LLMResponse, Role, TokenUsage};

const DEFAULT_MODEL: &str = "gpt-4o";
const VISION_MODEL: &str = "gpt-4o";
const TEXT_TIMEOUT_SECS: u64 = 60;
const VISION_TIMEOUT_SECS: u64 = 120;

/// Remote provider A (§4.6): one chat/completions schema, Bearer auth.
pub struct OpenAiProvider {
    api_key: Option<String>,
    client: reqwest::Client,
    models: Vec<String>,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            client: reqwest::Client::new(),
            models: vec![DEFAULT_MODEL.to_string(), "gpt-4o-mini".to_string()],
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    fn require_key(&self) -> CoreResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CoreError::InvalidApiKey("remote-a".to_string()))
    }

    fn to_wire_messages(request: &LLMRequest) -> Vec<serde_json::Value> {
        request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                let content: Vec<serde_json::Value> = m
                    .parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text(t) => json!({"type": "text", "text": t}),
                        ContentPart::ImageRef { storage_id, mime_type } => json!({
                            "type": "image_url",
                            "image_url": {"url": format!("data:{mime_type};id,{storage_id}")}
                        }),
                    })
                    .collect();
                json!({"role": role, "content": content})
            })
            .collect()
    }

    async fn call(&self, request: &LLMRequest, model: &str, timeout_secs: u64) -> CoreResult<LLMResponse> {
        let key = self.require_key()?;
        let started = std::time::Instant::now();

        let body = json!({
            "model": model,
            "messages": Self::to_wire_messages(request),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
        });

        let response = tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(key)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| CoreError::Timeout(std::time::Duration::from_secs(timeout_secs)))?
        .map_err(|e| CoreError::Provider(format!("remote-a request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CoreError::InvalidApiKey("remote-a".to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::RateLimitExceeded("remote-a".to_string()));
        }
        if !status.is_success() {
            return Err(CoreError::Provider(format!(
                "remote-a returned status {status}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Provider(format!("remote-a response parse error: {e}")))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        let usage = parsed.usage.unwrap_or_default();

        Ok(LLMResponse {
            content,
            model: model.to_string(),
            provider: "remote-a".to_string(),
            tokens: TokenUsage {
                prompt: usage.prompt_tokens,
                completion: usage.completion_tokens,
                total: usage.total_tokens,
            },
            cost: estimate_cost(model, usage.prompt_tokens, usage.completion_tokens),
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "remote-a"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn supported_models(&self) -> &[String] {
        &self.models
    }

    async fn generate_text(&self, request: &LLMRequest) -> CoreResult<LLMResponse> {
        let model = request.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        self.call(request, &model, TEXT_TIMEOUT_SECS).await
    }

    async fn analyze_image(&self, request: &LLMRequest) -> CoreResult<LLMResponse> {
        let model = request.model.clone().unwrap_or_else(|| VISION_MODEL.to_string());
        self.call(request, &model, VISION_TIMEOUT_SECS).await
    }

    async fn health_check(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// Conservative per-1000-token tariff lookup (§4.6); unknown models map to
/// a flat default rather than failing the call.
fn estimate_cost(model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let (input_rate, output_rate) = match model {
        "gpt-4o" => (0.0025, 0.01),
        "gpt-4o-mini" => (0.00015, 0.0006),
        _ => (0.002, 0.008),
    };
    (prompt_tokens as f64 / 1000.0) * input_rate + (completion_tokens as f64 / 1000.0) * output_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_uses_conservative_default_tariff() {
        let cost = estimate_cost("some-future-model", 1000, 1000);
        assert!((cost - 0.01).abs() < 1e-9);
    }
}
