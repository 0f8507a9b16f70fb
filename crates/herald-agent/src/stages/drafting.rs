use futures::future::BoxFuture;
use tracing::info;

use herald_core::campaign::Campaign;
use herald_core::error::{HeraldError, Result};
use herald_core::prompts::{join_context, render, FEEDBACK_SECTION, WRITER_PROMPT};
use herald_core::types::{Decision, HallucinationGrade, LoopKind, Stage};

use super::{cursor, spend_retry};
use crate::grading;
use crate::graph::{StageContext, StageHandler, Transition};

/// Drafts the current asset from its retrieved context and any reviewer note.
pub struct WriterStage;

impl StageHandler for WriterStage {
    fn stage(&self) -> Stage {
        Stage::Writer
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            let index = cursor(campaign, Stage::Writer)?;
            let task = &campaign.plan[index];
            let feedback = task
                .feedback_note
                .as_deref()
                .map(|note| render(FEEDBACK_SECTION, &[("note", note)]))
                .unwrap_or_default();
            let context = join_context(&task.retrieved_context);
            let prompt = render(WRITER_PROMPT, &[
                ("asset_type", task.asset_type.as_str()),
                ("context", context.as_str()),
                ("feedback", feedback.as_str()),
                ("goal", campaign.goal()),
            ]);
            let chunks = task.retrieved_context.clone();

            let generator = &ctx.collaborators.generator;
            let draft = ctx
                .policy
                .call("generator", || generator.generate(prompt.clone(), chunks.clone()))
                .await?;
            if draft.trim().is_empty() {
                return Err(HeraldError::GenerationUnavailable(format!(
                    "writer returned an empty draft for asset {}",
                    index
                )));
            }

            let task = &mut campaign.plan[index];
            info!(
                campaign_id = %campaign.id,
                asset_index = index,
                asset_type = %task.asset_type,
                revision = task.feedback_note.is_some(),
                "Draft written"
            );
            task.draft = Some(draft);
            task.grade_hallucination = HallucinationGrade::Unset;
            Ok(Transition::Route(Decision::Drafted))
        })
    }
}

/// Checks the draft is supported by the context it was written from.
pub struct HallucinationGraderStage;

impl StageHandler for HallucinationGraderStage {
    fn stage(&self) -> Stage {
        Stage::HallucinationGrader
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            let index = cursor(campaign, Stage::HallucinationGrader)?;
            let task = &campaign.plan[index];
            let draft = task.draft.as_deref().ok_or_else(|| {
                HeraldError::InvalidState(format!(
                    "asset {} reached grading without a draft",
                    index
                ))
            })?;
            let grade = grading::grade_hallucination(
                ctx.collaborators.classifier.as_ref(),
                ctx.policy,
                draft,
                &task.retrieved_context,
            )
            .await?;
            campaign.plan[index].grade_hallucination = grade;

            let negative = match grade {
                HallucinationGrade::Hallucinated => Decision::Hallucinated,
                HallucinationGrade::NeedsMoreRetrieval => Decision::MoreContextNeeded,
                _ => return Ok(Transition::Route(Decision::Grounded)),
            };
            if spend_retry(campaign, ctx, index, LoopKind::Hallucination, negative) {
                Ok(Transition::Route(negative))
            } else {
                Ok(Transition::Route(Decision::Grounded))
            }
        })
    }
}
