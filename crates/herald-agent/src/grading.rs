//! Grading services: verdict functions over collaborator output.
//!
//! Graders hold no state. Given identical classifier answers for identical
//! inputs they return identical verdicts; chunk relevance is checked in
//! retrieval order and stops at the first relevant chunk.

use tracing::{debug, warn};

use herald_core::campaign::{BudgetCharge, RetryLedger};
use herald_core::error::{HeraldError, Result};
use herald_core::traits::Classifier;
use herald_core::types::*;

use crate::collaborators::CallPolicy;

fn unexpected(task: &str, verdict: &Verdict) -> HeraldError {
    HeraldError::ClassificationUnavailable(format!(
        "unexpected verdict {:?} for {} check",
        verdict, task
    ))
}

/// Campaign request or small talk.
pub async fn classify_intent(
    classifier: &dyn Classifier,
    policy: &CallPolicy,
    goal: &str,
) -> Result<Intent> {
    let verdict = policy
        .call("classifier", || {
            classifier.classify(ClassifyTask::Intent {
                goal: goal.to_string(),
            })
        })
        .await?;
    match verdict {
        Verdict::Campaign => Ok(Intent::Campaign),
        Verdict::Chitchat => Ok(Intent::Chitchat),
        other => Err(unexpected("intent", &other)),
    }
}

/// Relevant if at least one chunk is judged related to the query.
pub async fn grade_retrieval(
    classifier: &dyn Classifier,
    policy: &CallPolicy,
    query: &str,
    chunks: &[String],
) -> Result<RetrievalGrade> {
    for (i, chunk) in chunks.iter().enumerate() {
        let verdict = policy
            .call("classifier", || {
                classifier.classify(ClassifyTask::ChunkRelevance {
                    query: query.to_string(),
                    chunk: chunk.clone(),
                })
            })
            .await?;
        match verdict {
            Verdict::Relevant => {
                debug!(chunk = i, "Relevant chunk found");
                return Ok(RetrievalGrade::Relevant);
            }
            Verdict::Irrelevant => continue,
            other => return Err(unexpected("chunk relevance", &other)),
        }
    }
    Ok(RetrievalGrade::Irrelevant)
}

/// Grounded, hallucinated, or starved of context.
pub async fn grade_hallucination(
    classifier: &dyn Classifier,
    policy: &CallPolicy,
    draft: &str,
    context: &[String],
) -> Result<HallucinationGrade> {
    let verdict = policy
        .call("classifier", || {
            classifier.classify(ClassifyTask::Grounding {
                draft: draft.to_string(),
                context: context.to_vec(),
            })
        })
        .await?;
    match verdict {
        Verdict::Grounded => Ok(HallucinationGrade::Grounded),
        Verdict::Hallucinated => Ok(HallucinationGrade::Hallucinated),
        Verdict::MoreContextNeeded => Ok(HallucinationGrade::NeedsMoreRetrieval),
        other => Err(unexpected("grounding", &other)),
    }
}

/// Brand compliance of one draft against the retrieved guidelines.
pub async fn check_compliance(
    classifier: &dyn Classifier,
    policy: &CallPolicy,
    asset_type: &str,
    draft: &str,
    guidelines: &[String],
) -> Result<ComplianceResult> {
    let verdict = policy
        .call("classifier", || {
            classifier.classify(ClassifyTask::Compliance {
                asset_type: asset_type.to_string(),
                draft: draft.to_string(),
                guidelines: guidelines.to_vec(),
            })
        })
        .await?;
    match verdict {
        Verdict::Pass { critique } => Ok(ComplianceResult {
            passed: true,
            critique,
        }),
        Verdict::Fail { critique } => Ok(ComplianceResult {
            passed: false,
            critique,
        }),
        other => Err(unexpected("compliance", &other)),
    }
}

/// How a negative verdict is routed once the retry budget has been charged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetRouting {
    /// Take the retry branch; carries the attempt number.
    Retry(u32),
    /// Budget spent: take the forward branch and record the marker.
    Forced(DegradedMarker),
}

/// Charge a negative verdict for `(index, kind)` against `bound`.
pub fn charge_budget(
    ledger: &mut RetryLedger,
    index: usize,
    kind: LoopKind,
    bound: u32,
    overridden: &str,
) -> BudgetRouting {
    match ledger.charge(index, kind, bound) {
        BudgetCharge::Retry(attempt) => BudgetRouting::Retry(attempt),
        BudgetCharge::Exhausted(attempts) => {
            warn!(
                asset_index = index,
                loop_kind = %kind,
                attempts,
                overridden,
                "Retry budget exhausted, accepting best-effort result"
            );
            BudgetRouting::Forced(DegradedMarker {
                loop_kind: kind,
                attempts,
                overridden: overridden.to_string(),
            })
        }
    }
}
