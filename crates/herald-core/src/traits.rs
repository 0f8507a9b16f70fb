use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// LLM client: one chat completion per call.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and return the assistant's text.
    fn complete(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<String>>;
}

/// Delegated content generation.
///
/// Fails with `GenerationUnavailable` when the backend cannot answer.
pub trait Generator: Send + Sync + 'static {
    fn generate(&self, prompt: String, context: Vec<String>) -> BoxFuture<'_, Result<String>>;
}

/// Delegated similarity search.
///
/// An empty result is valid; failures are `RetrievalUnavailable`.
pub trait Retriever: Send + Sync + 'static {
    fn retrieve(&self, query: String, top_k: usize) -> BoxFuture<'_, Result<Vec<String>>>;
}

/// Structured classification used by the grading services.
///
/// Must answer with one of the enumerated verdicts or fail with
/// `ClassificationUnavailable`.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, task: ClassifyTask) -> BoxFuture<'_, Result<Verdict>>;
}

/// Delegated document creation; failures are `PublishFailed`.
pub trait Publisher: Send + Sync + 'static {
    fn publish(
        &self,
        asset_type: String,
        title: String,
        body: String,
    ) -> BoxFuture<'_, Result<DocumentRef>>;
}
