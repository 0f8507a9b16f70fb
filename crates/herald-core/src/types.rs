use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named node in the campaign workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Router,
    Planner,
    Retriever,
    RetrievalGrader,
    QueryRewriter,
    Writer,
    HallucinationGrader,
    FeedbackProcessor,
    Reviewer,
    Publisher,
    /// Terminal: the run finished normally.
    End,
    /// Terminal: the run was abandoned.
    Aborted,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Router => "router",
            Stage::Planner => "planner",
            Stage::Retriever => "retriever",
            Stage::RetrievalGrader => "retrieval_grader",
            Stage::QueryRewriter => "query_rewriter",
            Stage::Writer => "writer",
            Stage::HallucinationGrader => "hallucination_grader",
            Stage::FeedbackProcessor => "feedback_processor",
            Stage::Reviewer => "reviewer",
            Stage::Publisher => "publisher",
            Stage::End => "end",
            Stage::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::End | Stage::Aborted)
    }

    /// The campaign status a run reports while this stage is active.
    pub fn status(self) -> CampaignStatus {
        match self {
            Stage::Router | Stage::Planner => CampaignStatus::Planning,
            Stage::Retriever
            | Stage::RetrievalGrader
            | Stage::QueryRewriter
            | Stage::Writer
            | Stage::HallucinationGrader
            | Stage::FeedbackProcessor => CampaignStatus::Drafting,
            Stage::Reviewer => CampaignStatus::Reviewing,
            Stage::Publisher => CampaignStatus::Publishing,
            Stage::End => CampaignStatus::Done,
            Stage::Aborted => CampaignStatus::Aborted,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision returned by a stage; keys the edge table together with the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Campaign,
    Chitchat,
    Planned,
    Retrieved,
    Relevant,
    Irrelevant,
    Rewritten,
    Drafted,
    Grounded,
    Hallucinated,
    MoreContextNeeded,
    NextAsset,
    NeedsRevision,
    AllApproved,
    Reviewed,
    Success,
    Failure,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Campaign => "campaign",
            Decision::Chitchat => "chitchat",
            Decision::Planned => "planned",
            Decision::Retrieved => "retrieved",
            Decision::Relevant => "relevant",
            Decision::Irrelevant => "irrelevant",
            Decision::Rewritten => "rewritten",
            Decision::Drafted => "drafted",
            Decision::Grounded => "grounded",
            Decision::Hallucinated => "hallucinated",
            Decision::MoreContextNeeded => "more_context_needed",
            Decision::NextAsset => "next_asset",
            Decision::NeedsRevision => "needs_revision",
            Decision::AllApproved => "all_approved",
            Decision::Reviewed => "reviewed",
            Decision::Success => "success",
            Decision::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Campaign,
    Chitchat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Planning,
    Drafting,
    AwaitingFeedback,
    Reviewing,
    Publishing,
    Done,
    Aborted,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Planning => "planning",
            CampaignStatus::Drafting => "drafting",
            CampaignStatus::AwaitingFeedback => "awaiting_feedback",
            CampaignStatus::Reviewing => "reviewing",
            CampaignStatus::Publishing => "publishing",
            CampaignStatus::Done => "done",
            CampaignStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Done | CampaignStatus::Aborted)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which grading loop a retry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    Retrieval,
    Hallucination,
}

impl std::fmt::Display for LoopKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopKind::Retrieval => f.write_str("retrieval"),
            LoopKind::Hallucination => f.write_str("hallucination"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalGrade {
    #[default]
    Unset,
    Relevant,
    Irrelevant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HallucinationGrade {
    #[default]
    Unset,
    Grounded,
    Hallucinated,
    NeedsMoreRetrieval,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    #[default]
    Pending,
    Approved,
    RevisionRequested,
}

/// Brand compliance verdict for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub passed: bool,
    pub critique: String,
}

/// Recorded when a grading loop ran out of budget and forward progress was forced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedMarker {
    pub loop_kind: LoopKind,
    /// Attempts consumed when the budget ran out.
    pub attempts: u32,
    /// The verdict that was overridden.
    pub overridden: String,
}

/// Reference to a published document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub url: String,
}

/// What a classification call is asked to judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyTask {
    /// Is the goal a campaign request or small talk?
    Intent { goal: String },
    /// Is a single retrieved chunk topically related to the query?
    ChunkRelevance { query: String, chunk: String },
    /// Is the draft supported by the retrieved context?
    Grounding { draft: String, context: Vec<String> },
    /// Does the draft comply with the brand guidelines?
    Compliance {
        asset_type: String,
        draft: String,
        guidelines: Vec<String>,
    },
}

impl ClassifyTask {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifyTask::Intent { .. } => "intent",
            ClassifyTask::ChunkRelevance { .. } => "chunk_relevance",
            ClassifyTask::Grounding { .. } => "grounding",
            ClassifyTask::Compliance { .. } => "compliance",
        }
    }
}

/// Enumerated verdicts a classifier may return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Campaign,
    Chitchat,
    Relevant,
    Irrelevant,
    Grounded,
    Hallucinated,
    MoreContextNeeded,
    Pass { critique: String },
    Fail { critique: String },
}

/// A human decision on one drafted asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FeedbackAction {
    Approve,
    RequestRevision { note: String },
}

/// Resume payload for a campaign suspended at the feedback stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackInput {
    pub decisions: BTreeMap<usize, FeedbackAction>,
}

impl FeedbackInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Approve every listed index in one call.
    pub fn approve_all(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            decisions: indices
                .into_iter()
                .map(|i| (i, FeedbackAction::Approve))
                .collect(),
        }
    }

    pub fn approve(mut self, index: usize) -> Self {
        self.decisions.insert(index, FeedbackAction::Approve);
        self
    }

    pub fn revise(mut self, index: usize, note: impl Into<String>) -> Self {
        self.decisions
            .insert(index, FeedbackAction::RequestRevision { note: note.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FeedbackAction> {
        self.decisions.get(&index)
    }
}

/// One routed edge, kept on the campaign for inspection and replay checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub stage: Stage,
    pub decision: Decision,
    pub next: Stage,
    /// Asset cursor at the time the stage ran (None before planning).
    #[serde(default)]
    pub asset_index: Option<usize>,
}

/// The pending suspension of a campaign awaiting human feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    /// Single-use token; a snapshot carrying it may be resumed once.
    pub token: String,
    /// Asset indices whose drafts await a decision.
    pub pending: Vec<usize>,
}

/// Role in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message sent to a text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// Events published while a campaign runs.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    StageEntered {
        campaign_id: String,
        stage: Stage,
        asset_index: Option<usize>,
    },
    Transition {
        campaign_id: String,
        record: TransitionRecord,
    },
    RetryConsumed {
        campaign_id: String,
        asset_index: usize,
        loop_kind: LoopKind,
        attempt: u32,
    },
    BudgetExhausted {
        campaign_id: String,
        asset_index: usize,
        loop_kind: LoopKind,
    },
    Suspended {
        campaign_id: String,
        pending: Vec<usize>,
    },
    Resumed {
        campaign_id: String,
    },
    Completed {
        campaign_id: String,
        status: CampaignStatus,
    },
    Failed {
        campaign_id: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_mapping() {
        assert_eq!(Stage::Router.status(), CampaignStatus::Planning);
        assert_eq!(Stage::HallucinationGrader.status(), CampaignStatus::Drafting);
        assert_eq!(Stage::Reviewer.status(), CampaignStatus::Reviewing);
        assert_eq!(Stage::Publisher.status(), CampaignStatus::Publishing);
        assert!(Stage::End.is_terminal());
        assert!(!Stage::FeedbackProcessor.is_terminal());
    }

    #[test]
    fn test_feedback_input_builders() {
        let input = FeedbackInput::new().approve(0).revise(1, "shorter");
        assert_eq!(input.get(0), Some(&FeedbackAction::Approve));
        assert_eq!(
            input.get(1),
            Some(&FeedbackAction::RequestRevision {
                note: "shorter".into()
            })
        );

        let all = FeedbackInput::approve_all([0, 1, 2]);
        assert_eq!(all.decisions.len(), 3);
    }

    #[test]
    fn test_feedback_input_json_shape() {
        let input = FeedbackInput::new().approve(0).revise(1, "shorter");
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["decisions"]["0"]["action"], "approve");
        assert_eq!(json["decisions"]["1"]["action"], "request_revision");
        assert_eq!(json["decisions"]["1"]["note"], "shorter");

        let parsed: FeedbackInput = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, input);
    }

    #[test]
    fn test_verdict_tagging() {
        let v: Verdict = serde_json::from_str(r#"{"verdict":"fail","critique":"too salesy"}"#).unwrap();
        assert_eq!(
            v,
            Verdict::Fail {
                critique: "too salesy".into()
            }
        );
        let v: Verdict = serde_json::from_str(r#"{"verdict":"more_context_needed"}"#).unwrap();
        assert_eq!(v, Verdict::MoreContextNeeded);
    }
}
