use std::sync::Arc;

use tracing::{info, warn};

use herald_core::campaign::Campaign;
use herald_core::error::{HeraldError, Result};
use herald_core::types::FeedbackInput;

use crate::checkpoint::SnapshotStore;
use crate::graph::{validate_resume, GraphEngine, RunOutcome};
use crate::snapshot::Snapshot;

/// Result of one `start` or `resume` call.
#[derive(Debug, Clone)]
pub struct CampaignRun {
    pub campaign_id: String,
    pub outcome: RunOutcome,
    /// Snapshot of the campaign as it stands after the call; also saved to the store.
    pub snapshot: Snapshot,
    pub campaign: Campaign,
}

/// Boundary API: starts campaigns and resumes them from snapshots.
///
/// Every call ends by saving the campaign's snapshot, so the store always
/// holds the latest state, including the drafts of a failed run.
pub struct CampaignOrchestrator {
    engine: GraphEngine,
    store: Arc<dyn SnapshotStore>,
}

impl CampaignOrchestrator {
    pub fn new(engine: GraphEngine, store: Arc<dyn SnapshotStore>) -> Self {
        Self { engine, store }
    }

    pub fn engine(&self) -> &GraphEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Create a campaign for `goal` and run it to its first suspension or end.
    pub async fn start_campaign(&self, goal: &str) -> Result<CampaignRun> {
        let mut campaign = Campaign::new(goal)?;
        info!(campaign_id = %campaign.id, goal = %campaign.goal(), "Starting campaign");
        let outcome = self.engine.advance(&mut campaign, None).await?;
        self.persist(campaign, outcome)
    }

    /// Resume a suspended snapshot with human feedback.
    ///
    /// The input is validated and the snapshot's suspension token consumed
    /// before anything runs; a snapshot that is not suspended, or was already
    /// resumed, is rejected with `InvalidResumeInput` and nothing is written.
    pub async fn resume_campaign(
        &self,
        snapshot: &Snapshot,
        input: FeedbackInput,
    ) -> Result<CampaignRun> {
        let mut campaign = snapshot.restore()?;
        validate_resume(&campaign, &input)?;

        let token = campaign
            .suspension
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or_else(|| HeraldError::InvalidResumeInput("snapshot has no suspension".into()))?;
        if !self.store.consume(&campaign.id, &token)? {
            warn!(campaign_id = %campaign.id, "Rejected resume of consumed snapshot");
            return Err(HeraldError::InvalidResumeInput(format!(
                "snapshot for campaign {} was already resumed",
                campaign.id
            )));
        }

        let outcome = self.engine.advance(&mut campaign, Some(input)).await?;
        self.persist(campaign, outcome)
    }

    /// Resume from the latest stored snapshot of `campaign_id`.
    pub async fn resume_latest(
        &self,
        campaign_id: &str,
        input: FeedbackInput,
    ) -> Result<CampaignRun> {
        let snapshot = self.store.load_latest(campaign_id)?.ok_or_else(|| {
            HeraldError::InvalidResumeInput(format!("no snapshot for campaign {}", campaign_id))
        })?;
        self.resume_campaign(&snapshot, input).await
    }

    /// Latest stored state of a campaign.
    pub fn load(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        self.store
            .load_latest(campaign_id)?
            .map(|s| s.restore())
            .transpose()
    }

    fn persist(&self, campaign: Campaign, outcome: RunOutcome) -> Result<CampaignRun> {
        let snapshot = Snapshot::capture(&campaign)?;
        self.store.save(&campaign.id, &snapshot, campaign.status)?;
        Ok(CampaignRun {
            campaign_id: campaign.id.clone(),
            outcome,
            snapshot,
            campaign,
        })
    }
}
