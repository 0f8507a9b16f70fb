use std::collections::HashMap;

use futures::future::BoxFuture;

use herald_core::campaign::Campaign;
use herald_core::config::WorkflowConfig;
use herald_core::error::Result;
use herald_core::event::EventBus;
use herald_core::types::{Decision, FeedbackInput, Stage};

use crate::collaborators::{CallPolicy, Collaborators};
use crate::stages;

/// What a stage asks the engine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Follow the edge keyed by this decision.
    Route(Decision),
    /// Park the campaign until a human answers.
    Suspend,
}

/// Everything a stage may read while it runs.
pub struct StageContext<'a> {
    pub collaborators: &'a Collaborators,
    pub workflow: &'a WorkflowConfig,
    pub policy: &'a CallPolicy,
    pub events: &'a EventBus,
    /// Human decisions; only present on the first stage after a suspension.
    pub resume: Option<&'a FeedbackInput>,
}

/// A named unit of work in the campaign graph.
///
/// A handler may mutate the campaign it is given and returns the transition
/// the engine should take. On error the engine discards every mutation.
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    fn run<'a>(
        &'a self,
        campaign: &'a mut Campaign,
        ctx: &'a StageContext<'a>,
    ) -> BoxFuture<'a, Result<Transition>>;
}

/// Lookup from stage name to its handler.
pub struct StageRegistry {
    handlers: HashMap<Stage, Box<dyn StageHandler>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Every non-terminal stage of the campaign workflow.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(stages::RouterStage));
        registry.register(Box::new(stages::PlannerStage));
        registry.register(Box::new(stages::RetrieverStage));
        registry.register(Box::new(stages::RetrievalGraderStage));
        registry.register(Box::new(stages::QueryRewriterStage));
        registry.register(Box::new(stages::WriterStage));
        registry.register(Box::new(stages::HallucinationGraderStage));
        registry.register(Box::new(stages::FeedbackStage));
        registry.register(Box::new(stages::ReviewerStage));
        registry.register(Box::new(stages::PublisherStage));
        registry
    }

    /// Register a handler, replacing any previous one for the same stage.
    pub fn register(&mut self, handler: Box<dyn StageHandler>) {
        self.handlers.insert(handler.stage(), handler);
    }

    pub fn get(&self, stage: Stage) -> Option<&dyn StageHandler> {
        self.handlers.get(&stage).map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_non_terminal_stages() {
        let registry = StageRegistry::standard();
        assert_eq!(registry.len(), 10);
        assert!(registry.get(Stage::FeedbackProcessor).is_some());
        assert!(registry.get(Stage::End).is_none());
        assert!(registry.get(Stage::Aborted).is_none());
        for stage in [Stage::Router, Stage::Writer, Stage::Publisher] {
            assert_eq!(registry.get(stage).map(|h| h.stage()), Some(stage));
        }
    }
}
