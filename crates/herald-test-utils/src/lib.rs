//! Collaborator doubles and fixtures shared by Herald's test suites.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use herald_core::error::{HeraldError, Result};
use herald_core::prompts::{PLANNER_ROLE, REWRITER_ROLE, WRITER_ROLE};
use herald_core::traits::{Classifier, Generator, Publisher, Retriever};
use herald_core::types::{ClassifyTask, DocumentRef, Verdict};

pub const SNEAKER_GOAL: &str = "Promote eco-friendly sneaker launch";

/// Generator that answers planner, rewriter, and writer prompts from a script.
pub struct ScriptedGenerator {
    plan: Vec<String>,
    prompts: Mutex<Vec<String>>,
    rewrites: AtomicUsize,
    drafts: AtomicUsize,
    failures_left: AtomicUsize,
    failure: fn() -> HeraldError,
}

impl ScriptedGenerator {
    /// Plan the given asset types, then draft deterministically.
    pub fn for_plan(assets: &[&str]) -> Self {
        Self {
            plan: assets.iter().map(|s| s.to_string()).collect(),
            prompts: Mutex::new(Vec::new()),
            rewrites: AtomicUsize::new(0),
            drafts: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            failure: || HeraldError::GenerationUnavailable("HTTP 503: overloaded".into()),
        }
    }

    /// Fail the next `n` calls with a transient error before answering.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.failures_left = AtomicUsize::new(n);
        self
    }

    /// Fail every call with a non-transient error.
    pub fn unavailable() -> Self {
        Self {
            failures_left: AtomicUsize::new(usize::MAX),
            failure: || HeraldError::GenerationUnavailable("HTTP 401: invalid api key".into()),
            ..Self::for_plan(&[])
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Prompts sent for drafting, in order.
    pub fn writer_prompts(&self) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.starts_with(WRITER_ROLE))
            .collect()
    }

    pub fn draft_count(&self) -> usize {
        self.drafts.load(Ordering::SeqCst)
    }
}

fn asset_type_of(prompt: &str) -> &str {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("Asset Type: "))
        .unwrap_or("asset")
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: String, _context: Vec<String>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push(prompt.clone());

            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                if left != usize::MAX {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                }
                return Err((self.failure)());
            }

            if prompt.starts_with(PLANNER_ROLE) {
                return Ok(serde_json::json!({ "steps": self.plan }).to_string());
            }
            if prompt.starts_with(REWRITER_ROLE) {
                let n = self.rewrites.fetch_add(1, Ordering::SeqCst) + 1;
                return Ok(format!("refined query {}", n));
            }
            if prompt.starts_with(WRITER_ROLE) {
                let n = self.drafts.fetch_add(1, Ordering::SeqCst) + 1;
                return Ok(format!("{} draft #{}", asset_type_of(&prompt), n));
            }
            Ok(String::new())
        })
    }
}

/// Classifier answering from per-task queues, falling back to fixed defaults.
pub struct ScriptedClassifier {
    intent: Verdict,
    relevance: Mutex<VecDeque<Verdict>>,
    relevance_default: Verdict,
    grounding: Mutex<VecDeque<Verdict>>,
    grounding_default: Verdict,
    compliance: Verdict,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl Default for ScriptedClassifier {
    fn default() -> Self {
        Self {
            intent: Verdict::Campaign,
            relevance: Mutex::new(VecDeque::new()),
            relevance_default: Verdict::Relevant,
            grounding: Mutex::new(VecDeque::new()),
            grounding_default: Verdict::Grounded,
            compliance: Verdict::Pass {
                critique: "On brand.".into(),
            },
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl ScriptedClassifier {
    /// Every check passes: campaign intent, relevant chunks, grounded drafts.
    pub fn approving() -> Self {
        Self::default()
    }

    pub fn chitchat() -> Self {
        Self {
            intent: Verdict::Chitchat,
            ..Self::default()
        }
    }

    pub fn always_irrelevant() -> Self {
        Self {
            relevance_default: Verdict::Irrelevant,
            ..Self::default()
        }
    }

    pub fn always_hallucinated() -> Self {
        Self {
            grounding_default: Verdict::Hallucinated,
            ..Self::default()
        }
    }

    /// Answer chunk-relevance checks from this queue first.
    pub fn with_relevance(self, verdicts: Vec<Verdict>) -> Self {
        *self.relevance.lock().unwrap() = verdicts.into();
        self
    }

    /// Answer grounding checks from this queue first.
    pub fn with_grounding(self, verdicts: Vec<Verdict>) -> Self {
        *self.grounding.lock().unwrap() = verdicts.into();
        self
    }

    pub fn with_compliance(mut self, verdict: Verdict) -> Self {
        self.compliance = verdict;
        self
    }

    /// Replace the intent verdict, e.g. with one outside the intent set.
    pub fn with_intent(mut self, verdict: Verdict) -> Self {
        self.intent = verdict;
        self
    }

    /// Number of calls made for a task kind ("intent", "chunk_relevance", ...).
    pub fn calls(&self, kind: &str) -> usize {
        self.calls.lock().unwrap().get(kind).copied().unwrap_or(0)
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&self, task: ClassifyTask) -> BoxFuture<'_, Result<Verdict>> {
        Box::pin(async move {
            *self.calls.lock().unwrap().entry(task.kind()).or_insert(0) += 1;
            let verdict = match task {
                ClassifyTask::Intent { .. } => self.intent.clone(),
                ClassifyTask::ChunkRelevance { .. } => self
                    .relevance
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| self.relevance_default.clone()),
                ClassifyTask::Grounding { .. } => self
                    .grounding
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| self.grounding_default.clone()),
                ClassifyTask::Compliance { .. } => self.compliance.clone(),
            };
            Ok(verdict)
        })
    }
}

/// Retriever returning the same chunks for every query.
pub struct StaticRetriever {
    chunks: Vec<String>,
    queries: Mutex<Vec<String>>,
    delay: Option<Duration>,
    delayed_calls: AtomicUsize,
}

impl StaticRetriever {
    pub fn new(chunks: Vec<&str>) -> Self {
        Self {
            chunks: chunks.into_iter().map(String::from).collect(),
            queries: Mutex::new(Vec::new()),
            delay: None,
            delayed_calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(vec![])
    }

    /// Sleep for `delay` on the first `calls` retrievals.
    pub fn with_delay(mut self, calls: usize, delay: Duration) -> Self {
        self.delay = Some(delay);
        self.delayed_calls = AtomicUsize::new(calls);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl Retriever for StaticRetriever {
    fn retrieve(&self, query: String, top_k: usize) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            self.queries.lock().unwrap().push(query);
            if let Some(delay) = self.delay {
                let left = self.delayed_calls.load(Ordering::SeqCst);
                if left > 0 {
                    self.delayed_calls.store(left - 1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                }
            }
            Ok(self.chunks.iter().take(top_k).cloned().collect())
        })
    }
}

/// A published document as seen by [`RecordingPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedDoc {
    pub asset_type: String,
    pub title: String,
    pub body: String,
}

/// Publisher that keeps every document in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    docs: Mutex<Vec<PublishedDoc>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> Vec<PublishedDoc> {
        self.docs.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(
        &self,
        asset_type: String,
        title: String,
        body: String,
    ) -> BoxFuture<'_, Result<DocumentRef>> {
        Box::pin(async move {
            let mut docs = self.docs.lock().unwrap();
            docs.push(PublishedDoc {
                asset_type,
                title,
                body,
            });
            let id = format!("doc-{}", docs.len());
            Ok(DocumentRef {
                url: format!("memory://{}", id),
                id,
            })
        })
    }
}

/// Publisher that always fails.
pub struct FailingPublisher {
    reason: String,
}

impl FailingPublisher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Publisher for FailingPublisher {
    fn publish(&self, _: String, _: String, _: String) -> BoxFuture<'_, Result<DocumentRef>> {
        Box::pin(async move { Err(HeraldError::PublishFailed(self.reason.clone())) })
    }
}

/// Shared handles to the doubles, so tests can inspect them after a run.
pub struct TestCollaborators {
    pub generator: Arc<ScriptedGenerator>,
    pub classifier: Arc<ScriptedClassifier>,
    pub retriever: Arc<StaticRetriever>,
    pub publisher: Arc<RecordingPublisher>,
}

impl TestCollaborators {
    /// The happy path: plan `assets`, every grade passes, publishing succeeds.
    pub fn happy(assets: &[&str]) -> Self {
        Self::with_classifier(assets, ScriptedClassifier::approving())
    }

    pub fn with_classifier(assets: &[&str], classifier: ScriptedClassifier) -> Self {
        Self {
            generator: Arc::new(ScriptedGenerator::for_plan(assets)),
            classifier: Arc::new(classifier),
            retriever: Arc::new(StaticRetriever::new(vec![
                "Our sneakers use recycled ocean plastic.",
                "Brand tone: upbeat, no jargon, never say 'cheap'.",
                "Launch date is May 1st.",
            ])),
            publisher: Arc::new(RecordingPublisher::new()),
        }
    }
}

/// Minimal valid config file contents.
pub fn minimal_config_toml() -> &'static str {
    r#"
[model]
provider = "openai"
model_id = "gpt-4o-mini"
"#
}

/// Write `contents` to a temporary `.toml` file.
pub fn temp_config(contents: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    tmp.write_all(contents.as_bytes()).expect("write temp config");
    tmp
}
