use futures::future::BoxFuture;
use tracing::info;

use herald_core::campaign::Campaign;
use herald_core::error::Result;
use herald_core::types::{Decision, Intent, Stage};

use crate::grading;
use crate::graph::{StageContext, StageHandler, Transition};

/// Decides whether the goal is a campaign request at all.
pub struct RouterStage;

impl StageHandler for RouterStage {
    fn stage(&self) -> Stage {
        Stage::Router
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            let intent = grading::classify_intent(
                ctx.collaborators.classifier.as_ref(),
                ctx.policy,
                campaign.goal(),
            )
            .await?;
            campaign.intent = Some(intent);
            info!(campaign_id = %campaign.id, intent = ?intent, "Goal classified");

            Ok(Transition::Route(match intent {
                Intent::Campaign => Decision::Campaign,
                Intent::Chitchat => Decision::Chitchat,
            }))
        })
    }
}
