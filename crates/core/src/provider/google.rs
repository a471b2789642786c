use serde::Deserialize;
use serde_json::json;

use crate::error::{CoreError, CoreResult};

use super::{ContentPart, LLMProvider, LLMRequest, LLMResponse, Message, Role, TokenUsage};

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const VISION_MODEL: &str = "gemini-1.5-pro";
const TEXT_TIMEOUT_SECS: u64 = 60;
const VISION_TIMEOUT_SECS: u64 = 120;

/// Remote provider B (§4.6): content-generation schema, API-key header.
/// Provider B has no system role, so this provider concatenates any system
/// message into the first user message before sending — the translation
/// step the engine itself owns, which is why this provider is hand-rolled
/// against the raw API instead of going through an abstraction that would
/// hide it.
pub struct GoogleProvider {
    api_key: Option<String>,
    client: reqwest::Client,
    models: Vec<String>,
    base_url: String,
}

impl GoogleProvider {
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("GOOGLE_API_KEY").ok(),
            client: reqwest::Client::new(),
            models: vec![DEFAULT_MODEL.to_string(), VISION_MODEL.to_string()],
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    fn require_key(&self) -> CoreResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CoreError::InvalidApiKey("remote-b".to_string()))
    }

    /// Concatenates the system message (if any) into the first user
    /// message, then maps the rest of the conversation to Google's
    /// `contents`/`parts` shape.
    fn to_wire_contents(messages: &[Message]) -> Vec<serde_json::Value> {
        let system_text: String = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.text())
            .collect::<Vec<_>>()
            .join("\n");

        let mut prefixed_first_user = false;
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                    Role::System => unreachable!("system messages filtered above"),
                };

                let mut parts: Vec<serde_json::Value> = Vec::new();
                if role == "user" && !system_text.is_empty() && !prefixed_first_user {
                    parts.push(json!({"text": system_text}));
                    prefixed_first_user = true;
                }
                for part in &m.parts {
                    match part {
                        ContentPart::Text(t) => parts.push(json!({"text": t})),
                        ContentPart::ImageRef { storage_id, mime_type } => {
                            parts.push(json!({
                                "inline_data": {"mime_type": mime_type, "data": storage_id}
                            }));
                        }
                    }
                }
                json!({"role": role, "parts": parts})
            })
            .collect()
    }

    async fn call(&self, request: &LLMRequest, model: &str, timeout_secs: u64) -> CoreResult<LLMResponse> {
        let key = self.require_key()?;
        let started = std::time::Instant::now();

        let body = json!({
            "contents": Self::to_wire_contents(&request.messages),
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
                "topP": request.top_p,
            }
        });

        let url = format!(
            "{}/models/{model}:generateContent?key={key}",
            self.base_url
        );

        let response = tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            self.client.post(&url).json(&body).send(),
        )
        .await
        .map_err(|_| CoreError::Timeout(std::time::Duration::from_secs(timeout_secs)))?
        .map_err(|e| CoreError::Provider(format!("remote-b request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CoreError::InvalidApiKey("remote-b".to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::RateLimitExceeded("remote-b".to_string()));
        }
        if !status.is_success() {
            return Err(CoreError::Provider(format!(
                "remote-b returned status {status}"
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Provider(format!("remote-b response parse error: {e}")))?;

        let content = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();

        // Provider B doesn't always return usage; the engine estimates it
        // from the request/response text when absent (§6).
        let tokens = parsed
            .usage_metadata
            .map(|u| TokenUsage {
                prompt: u.prompt_token_count,
                completion: u.candidates_token_count,
                total: u.total_token_count,
            })
            .unwrap_or_else(|| estimate_tokens(&request.messages, &content));

        Ok(LLMResponse {
            cost: estimate_cost(model, tokens.prompt, tokens.completion),
            content,
            model: model.to_string(),
            provider: "remote-b".to_string(),
            tokens,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

impl Default for GoogleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for GoogleProvider {
    fn name(&self) -> &str {
        "remote-b"
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

/// Token estimator (§4.5's `ceil(len/4)`) used when provider B omits usage
/// counts.
fn estimate_tokens(messages: &[Message], completion: &str) -> TokenUsage {
    let prompt_chars: usize = messages.iter().map(|m| m.text().len()).sum();
    let prompt = (prompt_chars as f64 / 4.0).ceil() as u32;
    let completion_tokens = (completion.len() as f64 / 4.0).ceil() as u32;
    TokenUsage {
        prompt,
        completion: completion_tokens,
        total: prompt + completion_tokens,
    }
}

fn estimate_cost(model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let (input_rate, output_rate) = match model {
        "gemini-1.5-pro" => (0.00125, 0.005),
        "gemini-1.5-flash" => (0.000075, 0.0003),
        _ => (0.001, 0.004),
    };
    (prompt_tokens as f64 / 1000.0) * input_rate + (completion_tokens as f64 / 1000.0) * output_rate
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_system_message_into_first_user_message() {
        let messages = vec![
            Message::system("Be concise."),
            Message::user("Summarize this document."),
        ];
        let contents = GoogleProvider::to_wire_contents(&messages);
        assert_eq!(contents.len(), 1);
        let parts = contents[0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "Be concise.");
        assert_eq!(parts[1]["text"], "Summarize this document.");
    }

    #[test]
    fn no_system_message_passes_through_unchanged() {
        let messages = vec![Message::user("Hello.")];
        let contents = GoogleProvider::to_wire_contents(&messages);
        assert_eq!(contents.len(), 1);
        let parts = contents[0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let messages = vec![
            Message::user("Hi"),
            Message {
                role: Role::Assistant,
                parts: vec![ContentPart::Text("Hello back".to_string())],
            },
        ];
        let contents = GoogleProvider::to_wire_contents(&messages);
        assert_eq!(contents[1]["role"], "model");
    }
}
