//! Stage handlers for the campaign workflow.
//!
//! Each handler reads and updates the campaign it is handed and returns the
//! decision that keys the next edge. Collaborator calls go through the
//! context's [`CallPolicy`](crate::collaborators::CallPolicy).

mod drafting;
mod feedback;
mod planner;
mod publishing;
mod retrieval;
mod router;

pub use drafting::{HallucinationGraderStage, WriterStage};
pub use feedback::FeedbackStage;
pub use planner::{parse_plan, PlannerStage};
pub use publishing::{PublisherStage, ReviewerStage};
pub use retrieval::{QueryRewriterStage, RetrievalGraderStage, RetrieverStage};
pub use router::RouterStage;

use tracing::{info, warn};

use herald_core::campaign::Campaign;
use herald_core::error::{HeraldError, Result};
use herald_core::types::{Decision, LoopKind, Stage, WorkflowEvent};

use crate::grading::{charge_budget, BudgetRouting};
use crate::graph::StageContext;

/// Index of the asset under the cursor, or an error naming the stage that needed it.
pub(crate) fn cursor(campaign: &Campaign, stage: Stage) -> Result<usize> {
    campaign.cursor().ok_or_else(|| {
        HeraldError::InvalidState(format!(
            "{} reached with asset cursor {} outside a plan of {} assets",
            stage,
            campaign.current_asset_index,
            campaign.plan.len()
        ))
    })
}

/// Spend one unit of a grading loop's budget on a negative verdict.
///
/// Returns true when the retry branch may be taken. When the budget is spent
/// the override is recorded on the asset and false is returned, so the
/// caller takes its forward branch instead.
pub(crate) fn spend_retry(
    campaign: &mut Campaign,
    ctx: &StageContext<'_>,
    index: usize,
    kind: LoopKind,
    verdict: Decision,
) -> bool {
    let bound = ctx.workflow.retry_bound;
    match charge_budget(&mut campaign.retries, index, kind, bound, verdict.as_str()) {
        BudgetRouting::Retry(attempt) => {
            info!(
                campaign_id = %campaign.id,
                asset_index = index,
                loop_kind = %kind,
                attempt,
                bound,
                "Retry budget consumed"
            );
            ctx.events.publish(WorkflowEvent::RetryConsumed {
                campaign_id: campaign.id.clone(),
                asset_index: index,
                loop_kind: kind,
                attempt,
            });
            true
        }
        BudgetRouting::Forced(marker) => {
            warn!(
                campaign_id = %campaign.id,
                asset_index = index,
                loop_kind = %kind,
                "Marking asset as degraded"
            );
            campaign.plan[index].degraded.push(marker);
            ctx.events.publish(WorkflowEvent::BudgetExhausted {
                campaign_id: campaign.id.clone(),
                asset_index: index,
                loop_kind: kind,
            });
            false
        }
    }
}
