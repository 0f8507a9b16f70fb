use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HeraldError, Result};
use crate::types::*;

/// One planned asset and the mutable state of its drafting loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTask {
    /// Label such as "Email" or "Blog Post".
    pub asset_type: String,
    /// Current retrieval query; rewritten by the QueryRewriter.
    pub query: String,
    /// Chunks from the last retrieval call, replaced wholesale.
    #[serde(default)]
    pub retrieved_context: Vec<String>,
    #[serde(default)]
    pub draft: Option<String>,
    #[serde(default)]
    pub grade_retrieval: RetrievalGrade,
    #[serde(default)]
    pub grade_hallucination: HallucinationGrade,
    #[serde(default)]
    pub feedback_status: FeedbackStatus,
    /// Human revision note; cleared once the next draft incorporates it.
    #[serde(default)]
    pub feedback_note: Option<String>,
    #[serde(default)]
    pub compliance: Option<ComplianceResult>,
    #[serde(default)]
    pub degraded: Vec<DegradedMarker>,
    #[serde(default)]
    pub document: Option<DocumentRef>,
}

impl AssetTask {
    pub fn new(asset_type: impl Into<String>, goal: &str) -> Self {
        let asset_type = asset_type.into();
        let query = format!("{} related to {}", asset_type, goal);
        Self {
            asset_type,
            query,
            retrieved_context: vec![],
            draft: None,
            grade_retrieval: RetrievalGrade::Unset,
            grade_hallucination: HallucinationGrade::Unset,
            feedback_status: FeedbackStatus::Pending,
            feedback_note: None,
            compliance: None,
            degraded: vec![],
            document: None,
        }
    }

    /// True while the asset has no draft or a human asked for a new one.
    pub fn needs_draft(&self) -> bool {
        self.draft.is_none() || self.feedback_status == FeedbackStatus::RevisionRequested
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Reopen the asset for a fresh drafting pass carrying the reviewer's note.
    pub fn request_revision(&mut self, note: impl Into<String>) {
        self.feedback_status = FeedbackStatus::RevisionRequested;
        self.feedback_note = Some(note.into());
        self.grade_retrieval = RetrievalGrade::Unset;
        self.grade_hallucination = HallucinationGrade::Unset;
        self.degraded.clear();
    }
}

/// Attempts consumed per grading loop for one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopAttempts {
    #[serde(default)]
    pub retrieval: u32,
    #[serde(default)]
    pub hallucination: u32,
}

impl LoopAttempts {
    fn slot(&mut self, kind: LoopKind) -> &mut u32 {
        match kind {
            LoopKind::Retrieval => &mut self.retrieval,
            LoopKind::Hallucination => &mut self.hallucination,
        }
    }

    fn get(&self, kind: LoopKind) -> u32 {
        match kind {
            LoopKind::Retrieval => self.retrieval,
            LoopKind::Hallucination => self.hallucination,
        }
    }
}

/// Outcome of charging one negative verdict against a retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCharge {
    /// Budget remains; take the retry branch. Carries the attempt number.
    Retry(u32),
    /// Budget is spent; forward progress must be forced.
    Exhausted(u32),
}

/// Bounded retry counters keyed by (asset index, loop kind).
///
/// Invariant: no counter ever exceeds the bound it is charged against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryLedger(BTreeMap<usize, LoopAttempts>);

impl RetryLedger {
    pub fn attempts(&self, index: usize, kind: LoopKind) -> u32 {
        self.0.get(&index).map(|a| a.get(kind)).unwrap_or(0)
    }

    /// Charge one negative verdict. The verdict that brings the count to
    /// `bound` is the last one allowed to count; it and any later ones
    /// report `Exhausted`.
    pub fn charge(&mut self, index: usize, kind: LoopKind, bound: u32) -> BudgetCharge {
        let slot = self.0.entry(index).or_default().slot(kind);
        if *slot >= bound {
            return BudgetCharge::Exhausted(*slot);
        }
        *slot += 1;
        if *slot >= bound {
            BudgetCharge::Exhausted(*slot)
        } else {
            BudgetCharge::Retry(*slot)
        }
    }

    pub fn reset(&mut self, index: usize) {
        self.0.remove(&index);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&usize, &LoopAttempts)> {
        self.0.iter()
    }
}

/// The single record threaded through every stage of a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    goal: String,
    #[serde(default)]
    pub intent: Option<Intent>,
    /// Arena of planned assets; indices are stable for the campaign's lifetime.
    #[serde(default)]
    pub plan: Vec<AssetTask>,
    #[serde(default)]
    pub current_asset_index: usize,
    #[serde(default)]
    pub retries: RetryLedger,
    pub status: CampaignStatus,
    pub current_stage: Stage,
    #[serde(default)]
    pub suspension: Option<Suspension>,
    /// Aggregate brand-compliance critique from the Reviewer.
    #[serde(default)]
    pub critique: Option<String>,
    /// Why the run was aborted, when it was.
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default)]
    pub journal: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a campaign positioned at the Router.
    pub fn new(goal: impl Into<String>) -> Result<Self> {
        let goal = goal.into();
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(HeraldError::EmptyGoal);
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            goal: goal.to_string(),
            intent: None,
            plan: vec![],
            current_asset_index: 0,
            retries: RetryLedger::default(),
            status: CampaignStatus::Planning,
            current_stage: Stage::Router,
            suspension: None,
            critique: None,
            failure: None,
            journal: vec![],
            created_at: Utc::now(),
        })
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Install the plan. A campaign is planned exactly once.
    pub fn install_plan(&mut self, asset_types: Vec<String>) -> Result<()> {
        if !self.plan.is_empty() {
            return Err(HeraldError::InvalidState(format!(
                "campaign {} already has a plan",
                self.id
            )));
        }
        self.plan = asset_types
            .into_iter()
            .map(|t| AssetTask::new(t, &self.goal))
            .collect();
        self.current_asset_index = 0;
        Ok(())
    }

    /// The asset under the cursor, if the cursor is inside the plan.
    pub fn current_asset(&self) -> Option<&AssetTask> {
        self.plan.get(self.current_asset_index)
    }

    pub fn current_asset_mut(&mut self) -> Option<&mut AssetTask> {
        self.plan.get_mut(self.current_asset_index)
    }

    /// Asset cursor when it points inside the plan.
    pub fn cursor(&self) -> Option<usize> {
        (self.current_asset_index < self.plan.len()).then_some(self.current_asset_index)
    }

    /// Indices of drafted assets whose feedback is still pending.
    pub fn pending_review(&self) -> Vec<usize> {
        self.plan
            .iter()
            .enumerate()
            .filter(|(_, t)| t.draft.is_some() && t.feedback_status == FeedbackStatus::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    /// Lowest-index asset that still needs a draft.
    pub fn next_undrafted(&self) -> Option<usize> {
        self.plan.iter().position(|t| t.needs_draft())
    }

    pub fn is_suspended(&self) -> bool {
        self.status == CampaignStatus::AwaitingFeedback && self.suspension.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_campaign_starts_at_router() {
        let c = Campaign::new("  Promote eco-friendly sneaker launch ").unwrap();
        assert_eq!(c.goal(), "Promote eco-friendly sneaker launch");
        assert_eq!(c.current_stage, Stage::Router);
        assert_eq!(c.status, CampaignStatus::Planning);
        assert!(c.plan.is_empty());
    }

    #[test]
    fn test_empty_goal_rejected() {
        assert!(matches!(Campaign::new("   "), Err(HeraldError::EmptyGoal)));
    }

    #[test]
    fn test_install_plan_once() {
        let mut c = Campaign::new("Launch").unwrap();
        c.install_plan(vec!["Email".into(), "Social Post".into()]).unwrap();
        assert_eq!(c.plan.len(), 2);
        assert_eq!(c.plan[0].query, "Email related to Launch");
        assert!(matches!(
            c.install_plan(vec!["Blog".into()]),
            Err(HeraldError::InvalidState(_))
        ));
        assert_eq!(c.plan.len(), 2);
    }

    #[test]
    fn test_ledger_charges_up_to_bound() {
        let mut ledger = RetryLedger::default();
        assert_eq!(ledger.charge(0, LoopKind::Retrieval, 3), BudgetCharge::Retry(1));
        assert_eq!(ledger.charge(0, LoopKind::Retrieval, 3), BudgetCharge::Retry(2));
        assert_eq!(ledger.charge(0, LoopKind::Retrieval, 3), BudgetCharge::Exhausted(3));
        assert_eq!(ledger.charge(0, LoopKind::Retrieval, 3), BudgetCharge::Exhausted(3));
        assert_eq!(ledger.attempts(0, LoopKind::Retrieval), 3);
        assert_eq!(ledger.attempts(0, LoopKind::Hallucination), 0);
        assert_eq!(ledger.attempts(1, LoopKind::Retrieval), 0);
    }

    #[test]
    fn test_ledger_zero_bound_never_counts() {
        let mut ledger = RetryLedger::default();
        assert_eq!(ledger.charge(2, LoopKind::Hallucination, 0), BudgetCharge::Exhausted(0));
        assert_eq!(ledger.attempts(2, LoopKind::Hallucination), 0);
    }

    #[test]
    fn test_ledger_reset_is_per_asset() {
        let mut ledger = RetryLedger::default();
        ledger.charge(0, LoopKind::Retrieval, 3);
        ledger.charge(1, LoopKind::Hallucination, 3);
        ledger.reset(0);
        assert_eq!(ledger.attempts(0, LoopKind::Retrieval), 0);
        assert_eq!(ledger.attempts(1, LoopKind::Hallucination), 1);
    }

    #[test]
    fn test_needs_draft_and_pending_review() {
        let mut c = Campaign::new("Launch").unwrap();
        c.install_plan(vec!["Email".into(), "Blog".into()]).unwrap();
        assert_eq!(c.next_undrafted(), Some(0));

        c.plan[0].draft = Some("hello".into());
        assert_eq!(c.next_undrafted(), Some(1));
        assert_eq!(c.pending_review(), vec![0]);

        c.plan[1].draft = Some("world".into());
        assert_eq!(c.next_undrafted(), None);

        c.plan[0].request_revision("shorter");
        assert_eq!(c.next_undrafted(), Some(0));
        assert_eq!(c.pending_review(), vec![1]);
        assert_eq!(c.plan[0].feedback_note.as_deref(), Some("shorter"));
    }

    #[test]
    fn test_serde_roundtrip_exact() {
        let mut c = Campaign::new("Launch").unwrap();
        c.install_plan(vec!["Email".into()]).unwrap();
        c.retries.charge(0, LoopKind::Retrieval, 3);
        let json = serde_json::to_string(&c).unwrap();
        let back: Campaign = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }
}
