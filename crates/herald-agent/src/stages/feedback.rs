use futures::future::BoxFuture;
use tracing::info;

use herald_core::campaign::Campaign;
use herald_core::error::Result;
use herald_core::types::{Decision, FeedbackAction, FeedbackInput, FeedbackStatus, Stage};

use crate::graph::{StageContext, StageHandler, Transition};

/// The human-in-the-loop gate.
///
/// Entered from the hallucination grader it either moves the cursor to the
/// next asset that needs a draft or, once every asset is drafted, asks the
/// engine to suspend. Entered with resume input it applies the decisions.
pub struct FeedbackStage;

impl StageHandler for FeedbackStage {
    fn stage(&self) -> Stage {
        Stage::FeedbackProcessor
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            match ctx.resume {
                Some(input) => Ok(apply_feedback(campaign, input)),
                None => Ok(collect_drafts(campaign)),
            }
        })
    }
}

fn collect_drafts(campaign: &mut Campaign) -> Transition {
    // A redraft that made it past grading goes back to waiting for review.
    // The note stays on the asset until then, so every regeneration in the
    // grading loops still carries it.
    if let Some(task) = campaign.current_asset_mut() {
        if task.draft.is_some() && task.feedback_status == FeedbackStatus::RevisionRequested {
            task.feedback_status = FeedbackStatus::Pending;
            task.feedback_note = None;
        }
    }

    match campaign.next_undrafted() {
        Some(next) => {
            info!(
                campaign_id = %campaign.id,
                from = campaign.current_asset_index,
                to = next,
                "Moving to next asset"
            );
            campaign.current_asset_index = next;
            Transition::Route(Decision::NextAsset)
        }
        None => Transition::Suspend,
    }
}

fn apply_feedback(campaign: &mut Campaign, input: &FeedbackInput) -> Transition {
    for (&index, action) in &input.decisions {
        let Some(task) = campaign.plan.get_mut(index) else {
            continue;
        };
        match action {
            FeedbackAction::Approve => task.feedback_status = FeedbackStatus::Approved,
            FeedbackAction::RequestRevision { note } => {
                task.request_revision(note.clone());
                campaign.retries.reset(index);
            }
        }
    }

    // Drafts the reviewer did not mention are taken as approved.
    for task in campaign.plan.iter_mut() {
        if task.draft.is_some() && task.feedback_status == FeedbackStatus::Pending {
            task.feedback_status = FeedbackStatus::Approved;
        }
    }

    let revised = campaign
        .plan
        .iter()
        .position(|t| t.feedback_status == FeedbackStatus::RevisionRequested);
    match revised {
        Some(index) => {
            info!(campaign_id = %campaign.id, asset_index = index, "Revision requested");
            campaign.current_asset_index = index;
            Transition::Route(Decision::NeedsRevision)
        }
        None => {
            info!(campaign_id = %campaign.id, assets = campaign.plan.len(), "All assets approved");
            campaign.current_asset_index = campaign.plan.len();
            Transition::Route(Decision::AllApproved)
        }
    }
}
