use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use herald_core::campaign::Campaign;
use herald_core::error::{HeraldError, Result};
use herald_core::prompts::{extract_json, render, PLANNER_PROMPT};
use herald_core::types::{Decision, Stage};

use crate::graph::{StageContext, StageHandler, Transition};

#[derive(Deserialize)]
struct PlanReply {
    steps: Vec<String>,
}

fn list_item() -> &'static Regex {
    static LIST_ITEM: OnceLock<Regex> = OnceLock::new();
    LIST_ITEM.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("list item pattern is valid")
    })
}

fn clean_step(step: &str) -> String {
    step.trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c == '`')
        .trim_end_matches(['.', ':', ','])
        .trim()
        .to_string()
}

/// Read asset types from a planner reply.
///
/// Prefers the `{"steps": [...]}` object; falls back to a bulleted or
/// numbered list. Blank and duplicate entries are dropped.
pub fn parse_plan(reply: &str) -> Vec<String> {
    let steps = match serde_json::from_str::<PlanReply>(extract_json(reply)) {
        Ok(plan) => plan.steps,
        Err(_) => reply
            .lines()
            .filter_map(|line| list_item().captures(line))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect(),
    };

    let mut plan: Vec<String> = Vec::new();
    for step in steps {
        let step = clean_step(&step);
        if !step.is_empty() && !plan.iter().any(|p| p.eq_ignore_ascii_case(&step)) {
            plan.push(step);
        }
    }
    plan
}

/// Turns the goal into an ordered list of assets to draft.
pub struct PlannerStage;

impl StageHandler for PlannerStage {
    fn stage(&self) -> Stage {
        Stage::Planner
    }

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>> {
        Box::pin(async move {
            let prompt = render(PLANNER_PROMPT, &[("goal", campaign.goal())]);
            let generator = &ctx.collaborators.generator;
            let reply = ctx
                .policy
                .call("generator", || generator.generate(prompt.clone(), vec![]))
                .await?;

            let mut steps = parse_plan(&reply);
            if steps.is_empty() {
                return Err(HeraldError::GenerationUnavailable(
                    "planner returned no assets".into(),
                ));
            }
            if steps.len() > ctx.workflow.max_assets {
                warn!(
                    campaign_id = %campaign.id,
                    planned = steps.len(),
                    max_assets = ctx.workflow.max_assets,
                    "Plan truncated"
                );
                steps.truncate(ctx.workflow.max_assets);
            }

            info!(campaign_id = %campaign.id, assets = ?steps, "Campaign planned");
            campaign.install_plan(steps)?;
            Ok(Transition::Route(Decision::Planned))
        })
    }
}
