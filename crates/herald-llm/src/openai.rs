use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use herald_core::config::ModelConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::LlmClient;
use herald_core::types::*;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const OLLAMA_API_URL: &str = "http://localhost:11434/v1/chat/completions";
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default chat-completions endpoint for a provider name.
pub fn default_endpoint(provider: &str) -> &'static str {
    match provider {
        "ollama" => OLLAMA_API_URL,
        "groq" => GROQ_API_URL,
        "openrouter" => OPENROUTER_API_URL,
        _ => OPENAI_API_URL,
    }
}

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self::with_endpoint(OPENAI_API_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|m| OaiMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content,
        })
        .collect()
}

/// Pull the assistant text out of a chat-completions response body.
pub(crate) fn parse_response(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
        HeraldError::GenerationUnavailable(format!("Malformed completion response: {}", e))
    })?;
    if let Some(usage) = &response.usage {
        debug!(
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "Completion usage"
        );
    }
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| HeraldError::GenerationUnavailable("Completion had no content".into()))
}

impl LlmClient for OpenAiClient {
    fn complete(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();

        Box::pin(async move {
            let url = config.base_url.as_deref().unwrap_or(&self.endpoint);

            // o-series models reject a temperature parameter
            let is_o_series = config.model_id.starts_with("o1")
                || config.model_id.starts_with("o3")
                || config.model_id.starts_with("o4");

            let body = ChatRequest {
                model: &config.model_id,
                messages: convert_messages(messages),
                max_tokens: config.max_tokens,
                temperature: if is_o_series {
                    None
                } else {
                    Some(config.temperature)
                },
                stream: false,
            };

            let mut req = self.http.post(url).json(&body);
            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| HeraldError::GenerationUnavailable(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            if !status.is_success() {
                return Err(HeraldError::GenerationUnavailable(format!(
                    "HTTP {}: {}",
                    status, text
                )));
            }
            parse_response(&text)
        })
    }
}
