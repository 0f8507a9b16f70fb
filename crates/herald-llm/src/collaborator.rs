//! Generation and classification on top of any [`LlmClient`].
//!
//! Classification prompts ask for a small JSON object; replies are parsed
//! leniently (fenced blocks and surrounding prose are tolerated) but must
//! land on one of the enumerated verdicts or the call fails with
//! `ClassificationUnavailable`.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use herald_core::config::ModelConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::prompts::*;
use herald_core::traits::{Classifier, Generator, LlmClient};
use herald_core::types::*;

/// Implements [`Generator`] and [`Classifier`] with one model.
pub struct LlmCollaborator {
    client: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl LlmCollaborator {
    pub fn new(client: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { client, config }
    }

    async fn ask(&self, prompt: String) -> Result<String> {
        self.client
            .complete(&self.config, vec![ChatMessage::user(prompt)])
            .await
    }
}

impl Generator for LlmCollaborator {
    fn generate(&self, prompt: String, _context: Vec<String>) -> BoxFuture<'_, Result<String>> {
        // Context is already rendered into the prompt by the calling stage.
        Box::pin(async move { self.ask(prompt).await.map(|text| text.trim().to_string()) })
    }
}

impl Classifier for LlmCollaborator {
    fn classify(&self, task: ClassifyTask) -> BoxFuture<'_, Result<Verdict>> {
        Box::pin(async move {
            let kind = task.kind();
            let prompt = classification_prompt(&task);
            let reply = self.ask(prompt).await.map_err(|e| match e {
                HeraldError::GenerationUnavailable(msg) => {
                    HeraldError::ClassificationUnavailable(msg)
                }
                other => other,
            })?;
            debug!(task = kind, reply = %reply, "Classifier reply");
            parse_verdict(&task, &reply)
        })
    }
}

fn classification_prompt(task: &ClassifyTask) -> String {
    match task {
        ClassifyTask::Intent { goal } => render(ROUTER_PROMPT, &[("goal", goal.as_str())]),
        ClassifyTask::ChunkRelevance { query, chunk } => render(
            RETRIEVAL_GRADER_PROMPT,
            &[("document", chunk.as_str()), ("question", query.as_str())],
        ),
        ClassifyTask::Grounding { draft, context } => render(
            HALLUCINATION_GRADER_PROMPT,
            &[
                ("documents", join_context(context).as_str()),
                ("generation", draft.as_str()),
            ],
        ),
        ClassifyTask::Compliance {
            asset_type,
            draft,
            guidelines,
        } => render(
            REVIEWER_PROMPT,
            &[
                ("guidelines", join_context(guidelines).as_str()),
                ("asset", asset_type.as_str()),
                ("content", draft.as_str()),
            ],
        ),
    }
}

#[derive(Deserialize)]
struct CategoryReply {
    category: String,
}

#[derive(Deserialize)]
struct ScoreReply {
    score: String,
}

#[derive(Deserialize)]
struct GroundingReply {
    verdict: String,
}

#[derive(Deserialize)]
struct ReviewReply {
    passed: bool,
    #[serde(default)]
    critique: String,
}

fn normalize(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn decode<T: for<'de> Deserialize<'de>>(task: &str, reply: &str) -> Result<T> {
    serde_json::from_str(extract_json(reply)).map_err(|e| {
        HeraldError::ClassificationUnavailable(format!(
            "unparseable {} reply ({}): {}",
            task, e, reply
        ))
    })
}

fn unknown(task: &str, label: &str) -> HeraldError {
    HeraldError::ClassificationUnavailable(format!("unknown {} label '{}'", task, label))
}

/// Map a model reply to a verdict for `task`.
pub fn parse_verdict(task: &ClassifyTask, reply: &str) -> Result<Verdict> {
    let kind = task.kind();
    match task {
        ClassifyTask::Intent { .. } => {
            let r: CategoryReply = decode(kind, reply)?;
            match normalize(&r.category).as_str() {
                "chitchat" => Ok(Verdict::Chitchat),
                "factual" | "analytical" | "clarificationneeded" => Ok(Verdict::Campaign),
                _ => Err(unknown(kind, &r.category)),
            }
        }
        ClassifyTask::ChunkRelevance { .. } => {
            let r: ScoreReply = decode(kind, reply)?;
            match normalize(&r.score).as_str() {
                "yes" => Ok(Verdict::Relevant),
                "no" => Ok(Verdict::Irrelevant),
                _ => Err(unknown(kind, &r.score)),
            }
        }
        ClassifyTask::Grounding { .. } => {
            let r: GroundingReply = decode(kind, reply)?;
            match normalize(&r.verdict).as_str() {
                "grounded" => Ok(Verdict::Grounded),
                "hallucinated" => Ok(Verdict::Hallucinated),
                "morecontextneeded" => Ok(Verdict::MoreContextNeeded),
                _ => Err(unknown(kind, &r.verdict)),
            }
        }
        ClassifyTask::Compliance { .. } => {
            let r: ReviewReply = decode(kind, reply)?;
            Ok(if r.passed {
                Verdict::Pass {
                    critique: r.critique,
                }
            } else {
                Verdict::Fail {
                    critique: r.critique,
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replies with canned text and records the prompts it saw.
    struct CannedClient {
        reply: std::result::Result<String, String>,
        seen: Mutex<Vec<String>>,
    }

    impl CannedClient {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(vec![]),
            })
        }

        fn failing(msg: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(msg.to_string()),
                seen: Mutex::new(vec![]),
            })
        }
    }

    impl LlmClient for CannedClient {
        fn complete(
            &self,
            _config: &ModelConfig,
            messages: Vec<ChatMessage>,
        ) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                let mut seen = self.seen.lock().unwrap();
                seen.extend(messages.into_iter().map(|m| m.content));
                self.reply
                    .clone()
                    .map_err(HeraldError::GenerationUnavailable)
            })
        }
    }

    fn config() -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-4o-mini".into(),
            api_key: None,
            base_url: None,
            max_tokens: 512,
            temperature: 0.0,
            retry: None,
        }
    }

    fn intent() -> ClassifyTask {
        ClassifyTask::Intent {
            goal: "Launch sneakers".into(),
        }
    }

    #[test]
    fn test_router_categories() {
        let task = intent();
        assert_eq!(
            parse_verdict(&task, r#"{"category": "ChitChat"}"#).unwrap(),
            Verdict::Chitchat
        );
        for category in ["Factual", "Analytical", "ClarificationNeeded"] {
            let reply = format!(r#"{{"category": "{}"}}"#, category);
            assert_eq!(parse_verdict(&task, &reply).unwrap(), Verdict::Campaign);
        }
        assert!(parse_verdict(&task, r#"{"category": "Poetry"}"#).is_err());
    }

    #[test]
    fn test_relevance_score() {
        let task = ClassifyTask::ChunkRelevance {
            query: "q".into(),
            chunk: "c".into(),
        };
        assert_eq!(
            parse_verdict(&task, "```json\n{\"score\": \"Yes\"}\n```").unwrap(),
            Verdict::Relevant
        );
        assert_eq!(
            parse_verdict(&task, r#"{"score": "no"}"#).unwrap(),
            Verdict::Irrelevant
        );
    }

    #[test]
    fn test_grounding_labels() {
        let task = ClassifyTask::Grounding {
            draft: "d".into(),
            context: vec![],
        };
        assert_eq!(
            parse_verdict(&task, r#"{"verdict": "more_context_needed"}"#).unwrap(),
            Verdict::MoreContextNeeded
        );
        assert_eq!(
            parse_verdict(&task, r#"{"verdict": "hallucinated"}"#).unwrap(),
            Verdict::Hallucinated
        );
    }

    #[test]
    fn test_compliance_reply() {
        let task = ClassifyTask::Compliance {
            asset_type: "Email".into(),
            draft: "d".into(),
            guidelines: vec![],
        };
        assert_eq!(
            parse_verdict(&task, r#"{"passed": false, "critique": "Too pushy."}"#).unwrap(),
            Verdict::Fail {
                critique: "Too pushy.".into()
            }
        );
    }

    #[test]
    fn test_prose_is_classification_failure() {
        let err = parse_verdict(&intent(), "I think this is chit chat").unwrap_err();
        assert!(matches!(err, HeraldError::ClassificationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_classify_renders_prompt() {
        let client = CannedClient::ok(r#"{"score": "yes"}"#);
        let collab = LlmCollaborator::new(client.clone(), config());
        let verdict = collab
            .classify(ClassifyTask::ChunkRelevance {
                query: "eco sneakers".into(),
                chunk: "recycled ocean plastic".into(),
            })
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Relevant);
        let seen = client.seen.lock().unwrap();
        assert!(seen[0].contains("User Question: eco sneakers"));
        assert!(seen[0].contains("recycled ocean plastic"));
    }

    #[tokio::test]
    async fn test_backend_failure_maps_per_role() {
        let collab = LlmCollaborator::new(CannedClient::failing("HTTP 401"), config());
        let err = collab.classify(intent()).await.unwrap_err();
        assert!(matches!(err, HeraldError::ClassificationUnavailable(_)));
        let err = collab.generate("p".into(), vec![]).await.unwrap_err();
        assert!(matches!(err, HeraldError::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_generate_trims() {
        let collab = LlmCollaborator::new(CannedClient::ok("  Hello there.\n"), config());
        assert_eq!(collab.generate("p".into(), vec![]).await.unwrap(), "Hello there.");
    }
}
