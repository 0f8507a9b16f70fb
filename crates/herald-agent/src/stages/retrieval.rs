use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use herald_core::campaign::Campaign;
use herald_core::error::Result;
use herald_core::prompts::{render, REWRITER_PROMPT};
use herald_core::types::{Decision, LoopKind, RetrievalGrade, Stage};

use super::{cursor, spend_retry};
use crate::grading;
use crate::graph::{StageContext, StageHandler, Transition};

/// Fetches context for the current asset's query.
pub struct RetrieverStage;

impl StageHandler for RetrieverStage {
    fn stage(&self) -> Stage {
        Stage::Retriever
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            let index = cursor(campaign, Stage::Retriever)?;
            let query = campaign.plan[index].query.clone();
            let top_k = ctx.workflow.top_k;
            let retriever = &ctx.collaborators.retriever;

            let chunks = ctx
                .policy
                .call("retriever", || retriever.retrieve(query.clone(), top_k))
                .await?;
            debug!(
                campaign_id = %campaign.id,
                asset_index = index,
                query = %query,
                chunks = chunks.len(),
                "Context retrieved"
            );

            let task = &mut campaign.plan[index];
            task.retrieved_context = chunks;
            task.grade_retrieval = RetrievalGrade::Unset;
            Ok(Transition::Route(Decision::Retrieved))
        })
    }
}

/// Checks that the retrieved context is about the asset at all.
pub struct RetrievalGraderStage;

impl StageHandler for RetrievalGraderStage {
    fn stage(&self) -> Stage {
        Stage::RetrievalGrader
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            let index = cursor(campaign, Stage::RetrievalGrader)?;
            let task = &campaign.plan[index];
            let grade = grading::grade_retrieval(
                ctx.collaborators.classifier.as_ref(),
                ctx.policy,
                &task.query,
                &task.retrieved_context,
            )
            .await?;
            campaign.plan[index].grade_retrieval = grade;

            if grade == RetrievalGrade::Relevant {
                return Ok(Transition::Route(Decision::Relevant));
            }
            if spend_retry(campaign, ctx, index, LoopKind::Retrieval, Decision::Irrelevant) {
                Ok(Transition::Route(Decision::Irrelevant))
            } else {
                Ok(Transition::Route(Decision::Relevant))
            }
        })
    }
}

/// Rewrites the current asset's query after a failed grade.
pub struct QueryRewriterStage;

impl StageHandler for QueryRewriterStage {
    fn stage(&self) -> Stage {
        Stage::QueryRewriter
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            let index = cursor(campaign, Stage::QueryRewriter)?;
            let task = &campaign.plan[index];
            let prompt = render(REWRITER_PROMPT, &[
                ("goal", campaign.goal()),
                ("asset_type", task.asset_type.as_str()),
                ("query", task.query.as_str()),
            ]);
            let generator = &ctx.collaborators.generator;
            let reply = ctx
                .policy
                .call("generator", || generator.generate(prompt.clone(), vec![]))
                .await?;

            let rewritten = reply
                .lines()
                .map(|l| l.trim().trim_matches('"').trim())
                .find(|l| !l.is_empty());
            let task = &mut campaign.plan[index];
            match rewritten {
                Some(query) => {
                    info!(
                        campaign_id = %campaign.id,
                        asset_index = index,
                        from = %task.query,
                        to = %query,
                        "Query rewritten"
                    );
                    task.query = query.to_string();
                }
                None => warn!(
                    campaign_id = %campaign.id,
                    asset_index = index,
                    "Rewriter returned nothing, keeping previous query"
                ),
            }
            Ok(Transition::Route(Decision::Rewritten))
        })
    }
}
