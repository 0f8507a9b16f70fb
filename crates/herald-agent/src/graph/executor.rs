use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use herald_core::campaign::Campaign;
use herald_core::config::WorkflowConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::event::EventBus;
use herald_core::types::*;

use super::edge::next_stage;
use super::stage::{StageContext, StageRegistry, Transition};
use crate::collaborators::{CallPolicy, Collaborators};

/// One drafted asset awaiting a human decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDraft {
    pub index: usize,
    pub asset_type: String,
    pub draft: String,
    /// True when a grading loop was forced past its retry budget.
    pub degraded: bool,
}

/// What a suspended run is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub campaign_id: String,
    pub token: String,
    pub pending: Vec<PendingDraft>,
}

impl FeedbackRequest {
    fn from_campaign(campaign: &Campaign) -> Self {
        let (token, indices) = match &campaign.suspension {
            Some(s) => (s.token.clone(), s.pending.clone()),
            None => (String::new(), vec![]),
        };
        let pending = indices
            .into_iter()
            .filter_map(|i| {
                campaign.plan.get(i).map(|task| PendingDraft {
                    index: i,
                    asset_type: task.asset_type.clone(),
                    draft: task.draft.clone().unwrap_or_default(),
                    degraded: task.is_degraded(),
                })
            })
            .collect();
        Self {
            campaign_id: campaign.id.clone(),
            token,
            pending,
        }
    }
}

/// How a call to [`GraphEngine::advance`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Suspended(FeedbackRequest),
    Completed,
    Failed(String),
}

impl RunOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, RunOutcome::Suspended(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// Check a resume payload against a suspended campaign without touching it.
pub fn validate_resume(campaign: &Campaign, input: &FeedbackInput) -> Result<()> {
    if !campaign.is_suspended() || campaign.current_stage != Stage::FeedbackProcessor {
        return Err(HeraldError::InvalidResumeInput(format!(
            "campaign {} is not awaiting feedback (status {}, stage {})",
            campaign.id, campaign.status, campaign.current_stage
        )));
    }
    if input.is_empty() {
        return Err(HeraldError::InvalidResumeInput(
            "no feedback decisions supplied".into(),
        ));
    }
    for (&index, action) in &input.decisions {
        let Some(task) = campaign.plan.get(index) else {
            return Err(HeraldError::InvalidResumeInput(format!(
                "asset index {} out of range (plan has {} assets)",
                index,
                campaign.plan.len()
            )));
        };
        if task.draft.is_none() {
            return Err(HeraldError::InvalidResumeInput(format!(
                "asset {} ({}) has no draft to review",
                index, task.asset_type
            )));
        }
        if let FeedbackAction::RequestRevision { note } = action {
            if note.trim().is_empty() {
                return Err(HeraldError::InvalidResumeInput(format!(
                    "revision note for asset {} is empty",
                    index
                )));
            }
        }
    }
    Ok(())
}

/// Drives a campaign through the stage graph.
///
/// `advance` runs stages one at a time until the campaign suspends for
/// feedback or reaches a terminal stage. Each stage works on a copy of the
/// campaign that is committed only when the stage succeeds; cancellation is
/// observed between stages.
pub struct GraphEngine {
    registry: StageRegistry,
    collaborators: Collaborators,
    workflow: WorkflowConfig,
    policy: CallPolicy,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl GraphEngine {
    pub fn new(collaborators: Collaborators, workflow: WorkflowConfig) -> Self {
        Self {
            registry: StageRegistry::standard(),
            collaborators,
            workflow,
            policy: CallPolicy::default(),
            events: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_registry(mut self, registry: StageRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn workflow(&self) -> &WorkflowConfig {
        &self.workflow
    }

    /// Run the campaign until it suspends or terminates.
    ///
    /// `resume` must be supplied exactly when the campaign is suspended at the
    /// feedback stage; an invalid payload is rejected before anything changes.
    /// Calling without input on a suspended campaign reports the same
    /// suspension again.
    pub async fn advance(
        &self,
        campaign: &mut Campaign,
        resume: Option<FeedbackInput>,
    ) -> Result<RunOutcome> {
        if campaign.status.is_terminal() || campaign.current_stage.is_terminal() {
            if let Some(input) = &resume {
                validate_resume(campaign, input)?;
            }
            return Ok(outcome_of(campaign));
        }

        let mut resume = match resume {
            Some(input) => {
                validate_resume(campaign, &input)?;
                campaign.suspension = None;
                campaign.status = CampaignStatus::Drafting;
                info!(
                    campaign_id = %campaign.id,
                    decisions = input.decisions.len(),
                    "Resuming campaign with feedback"
                );
                self.events.publish(WorkflowEvent::Resumed {
                    campaign_id: campaign.id.clone(),
                });
                Some(input)
            }
            None if campaign.is_suspended() => {
                return Ok(RunOutcome::Suspended(FeedbackRequest::from_campaign(campaign)));
            }
            None => None,
        };

        let mut steps = 0usize;
        loop {
            let stage = campaign.current_stage;
            if stage.is_terminal() {
                return Ok(self.finish(campaign));
            }
            if self.cancel.is_cancelled() {
                warn!(campaign_id = %campaign.id, stage = %stage, "Campaign run cancelled");
                return Ok(self.abort(campaign, HeraldError::Cancelled));
            }
            if steps >= self.workflow.max_transitions {
                return Ok(self.abort(
                    campaign,
                    HeraldError::TransitionLimit(self.workflow.max_transitions),
                ));
            }
            let Some(handler) = self.registry.get(stage) else {
                return Ok(self.abort(campaign, HeraldError::MissingStage(stage.to_string())));
            };

            campaign.status = stage.status();
            let asset_index = campaign.cursor();
            debug!(campaign_id = %campaign.id, stage = %stage, asset_index, "Entering stage");
            self.events.publish(WorkflowEvent::StageEntered {
                campaign_id: campaign.id.clone(),
                stage,
                asset_index,
            });

            let input = resume.take();
            let ctx = StageContext {
                collaborators: &self.collaborators,
                workflow: &self.workflow,
                policy: &self.policy,
                events: &self.events,
                resume: input.as_ref(),
            };

            let mut working = campaign.clone();
            let transition = match handler.run(&mut working, &ctx).await {
                Ok(t) => t,
                Err(e) => {
                    error!(campaign_id = %campaign.id, stage = %stage, error = %e, "Stage failed");
                    return Ok(self.abort(campaign, e));
                }
            };
            *campaign = working;
            steps += 1;

            match transition {
                Transition::Suspend => return Ok(self.suspend(campaign)),
                Transition::Route(decision) => {
                    let Some(next) = next_stage(stage, decision) else {
                        return Ok(self.abort(
                            campaign,
                            HeraldError::UnknownTransition {
                                stage: stage.to_string(),
                                decision: decision.to_string(),
                            },
                        ));
                    };
                    let record = TransitionRecord {
                        stage,
                        decision,
                        next,
                        asset_index,
                    };
                    debug!(
                        campaign_id = %campaign.id,
                        stage = %stage,
                        decision = %decision,
                        next = %next,
                        "Transition"
                    );
                    campaign.journal.push(record.clone());
                    campaign.current_stage = next;
                    self.events.publish(WorkflowEvent::Transition {
                        campaign_id: campaign.id.clone(),
                        record,
                    });
                }
            }
        }
    }

    fn suspend(&self, campaign: &mut Campaign) -> RunOutcome {
        let pending = campaign.pending_review();
        campaign.suspension = Some(Suspension {
            token: Uuid::new_v4().to_string(),
            pending: pending.clone(),
        });
        campaign.status = CampaignStatus::AwaitingFeedback;
        info!(
            campaign_id = %campaign.id,
            pending = ?pending,
            "Campaign suspended awaiting feedback"
        );
        self.events.publish(WorkflowEvent::Suspended {
            campaign_id: campaign.id.clone(),
            pending,
        });
        RunOutcome::Suspended(FeedbackRequest::from_campaign(campaign))
    }

    fn finish(&self, campaign: &mut Campaign) -> RunOutcome {
        match campaign.current_stage {
            Stage::End => {
                campaign.status = if campaign.intent == Some(Intent::Chitchat) {
                    CampaignStatus::Aborted
                } else {
                    CampaignStatus::Done
                };
                info!(campaign_id = %campaign.id, status = %campaign.status, "Campaign completed");
                self.events.publish(WorkflowEvent::Completed {
                    campaign_id: campaign.id.clone(),
                    status: campaign.status,
                });
                RunOutcome::Completed
            }
            _ => {
                campaign.status = CampaignStatus::Aborted;
                let reason = failure_reason(campaign);
                error!(campaign_id = %campaign.id, reason = %reason, "Campaign aborted");
                self.events.publish(WorkflowEvent::Failed {
                    campaign_id: campaign.id.clone(),
                    reason: reason.clone(),
                });
                RunOutcome::Failed(reason)
            }
        }
    }

    fn abort(&self, campaign: &mut Campaign, cause: HeraldError) -> RunOutcome {
        campaign.failure = Some(cause.to_string());
        campaign.current_stage = Stage::Aborted;
        self.finish(campaign)
    }
}

fn failure_reason(campaign: &Campaign) -> String {
    campaign
        .failure
        .clone()
        .unwrap_or_else(|| "campaign aborted".to_string())
}

/// Outcome reported for a campaign that already reached a terminal stage.
fn outcome_of(campaign: &Campaign) -> RunOutcome {
    match campaign.current_stage {
        Stage::End => RunOutcome::Completed,
        _ => RunOutcome::Failed(failure_reason(campaign)),
    }
}
