use futures::future::BoxFuture;
use tracing::{error, info, warn};

use herald_core::campaign::Campaign;
use herald_core::error::{HeraldError, Result};
use herald_core::types::{Decision, Stage};

use crate::grading;
use crate::graph::{StageContext, StageHandler, Transition};

/// Brand-compliance review of every approved draft.
///
/// Results are recorded per asset and as one aggregate critique; a failing
/// review does not stop publication.
pub struct ReviewerStage;

impl StageHandler for ReviewerStage {
    fn stage(&self) -> Stage {
        Stage::Reviewer
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            let query = ctx.workflow.guidelines_query.clone();
            let top_k = ctx.workflow.top_k;
            let retriever = &ctx.collaborators.retriever;
            let guidelines = ctx
                .policy
                .call("retriever", || retriever.retrieve(query.clone(), top_k))
                .await?;

            let classifier = ctx.collaborators.classifier.as_ref();
            let mut critique = String::new();
            for (index, task) in campaign.plan.iter_mut().enumerate() {
                let Some(draft) = task.draft.as_deref() else {
                    continue;
                };
                let result = grading::check_compliance(
                    classifier,
                    ctx.policy,
                    &task.asset_type,
                    draft,
                    &guidelines,
                )
                .await?;
                if !result.passed {
                    warn!(
                        asset_index = index,
                        asset_type = %task.asset_type,
                        critique = %result.critique,
                        "Draft failed brand review"
                    );
                }
                critique.push_str(&format!(
                    "**{} Review:**\n{}\n\n",
                    task.asset_type, result.critique
                ));
                task.compliance = Some(result);
            }

            let failed = campaign
                .plan
                .iter()
                .filter(|t| t.compliance.as_ref().is_some_and(|c| !c.passed))
                .count();
            info!(campaign_id = %campaign.id, failed, "Brand review finished");
            campaign.critique = Some(critique.trim_end().to_string());
            Ok(Transition::Route(Decision::Reviewed))
        })
    }
}

/// Publishes every asset that does not have a document yet.
///
/// Publishing is not retried; the first failure ends the run with the
/// documents created so far kept on their assets.
pub struct PublisherStage;

impl StageHandler for PublisherStage {
    fn stage(&self) -> Stage {
        Stage::Publisher
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            let goal = campaign.goal().to_string();
            let publisher = &ctx.collaborators.publisher;
            let mut failure = None;

            for (index, task) in campaign.plan.iter_mut().enumerate() {
                if task.document.is_some() {
                    continue;
                }
                let Some(body) = task.draft.clone() else {
                    continue;
                };
                let title = format!("{} - {}", goal, task.asset_type);
                let published = ctx
                    .policy
                    .once(
                        "publisher",
                        publisher.publish(task.asset_type.clone(), title, body),
                    )
                    .await;
                match published {
                    Ok(doc) => {
                        info!(asset_index = index, url = %doc.url, "Asset published");
                        task.document = Some(doc);
                    }
                    Err(e) => {
                        error!(asset_index = index, error = %e, "Publishing failed");
                        failure = Some(match e {
                            HeraldError::PublishFailed(_) => e,
                            other => HeraldError::PublishFailed(other.to_string()),
                        });
                        break;
                    }
                }
            }

            match failure {
                Some(e) => {
                    campaign.failure = Some(e.to_string());
                    Ok(Transition::Route(Decision::Failure))
                }
                None => Ok(Transition::Route(Decision::Success)),
            }
        })
    }
}
