use herald_core::types::{Decision, Stage};

/// An edge connecting two stages, keyed by the decision the source returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: Stage,
    pub decision: Decision,
    pub to: Stage,
}

const fn edge(from: Stage, decision: Decision, to: Stage) -> Edge {
    Edge { from, decision, to }
}

/// The campaign workflow. Each (stage, decision) pair appears once.
pub const EDGES: &[Edge] = &[
    edge(Stage::Router, Decision::Campaign, Stage::Planner),
    edge(Stage::Router, Decision::Chitchat, Stage::End),
    edge(Stage::Planner, Decision::Planned, Stage::Retriever),
    edge(Stage::Retriever, Decision::Retrieved, Stage::RetrievalGrader),
    edge(Stage::RetrievalGrader, Decision::Relevant, Stage::Writer),
    edge(Stage::RetrievalGrader, Decision::Irrelevant, Stage::QueryRewriter),
    edge(Stage::QueryRewriter, Decision::Rewritten, Stage::Retriever),
    edge(Stage::Writer, Decision::Drafted, Stage::HallucinationGrader),
    edge(Stage::HallucinationGrader, Decision::Grounded, Stage::FeedbackProcessor),
    edge(Stage::HallucinationGrader, Decision::Hallucinated, Stage::QueryRewriter),
    edge(Stage::HallucinationGrader, Decision::MoreContextNeeded, Stage::Retriever),
    edge(Stage::FeedbackProcessor, Decision::NextAsset, Stage::Retriever),
    edge(Stage::FeedbackProcessor, Decision::NeedsRevision, Stage::Retriever),
    edge(Stage::FeedbackProcessor, Decision::AllApproved, Stage::Reviewer),
    edge(Stage::Reviewer, Decision::Reviewed, Stage::Publisher),
    edge(Stage::Publisher, Decision::Success, Stage::End),
    edge(Stage::Publisher, Decision::Failure, Stage::Aborted),
];

/// Look up the stage that follows `stage` when it returns `decision`.
pub fn next_stage(stage: Stage, decision: Decision) -> Option<Stage> {
    EDGES
        .iter()
        .find(|e| e.from == stage && e.decision == decision)
        .map(|e| e.to)
}

/// Decisions `stage` may legally return.
pub fn decisions_from(stage: Stage) -> Vec<Decision> {
    EDGES
        .iter()
        .filter(|e| e.from == stage)
        .map(|e| e.decision)
        .collect()
}
