pub mod collaborator;
pub mod openai;
pub mod retry;

use herald_core::config::{AppConfig, ModelConfig, RetryConfig};
use herald_core::traits::LlmClient;

pub use collaborator::LlmCollaborator;
pub use openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client for the configured provider.
///
/// Every supported provider speaks the OpenAI chat-completions protocol;
/// the provider name only picks the default endpoint.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    Box::new(OpenAiClient::with_endpoint(openai::default_endpoint(
        &config.provider,
    )))
}

/// Primary model plus fallbacks, wrapped in retry.
pub fn client_from_config(config: &AppConfig) -> Box<dyn LlmClient> {
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|m| (m.clone(), create_client(m)))
        .collect();
    Box::new(RetryingClient::new(
        create_client(&config.model),
        fallbacks,
        request_retry(&config.model),
    ))
}

/// Request-level retry for the primary model.
///
/// Stage calls already retry transient failures under `[collaborators]`, so
/// the client only retries on its own when `[model.retry]` is set. Without
/// it a transient failure goes straight to the fallback models.
pub fn request_retry(model: &ModelConfig) -> RetryConfig {
    model.retry.clone().unwrap_or(RetryConfig {
        max_retries: 0,
        ..RetryConfig::default()
    })
}
