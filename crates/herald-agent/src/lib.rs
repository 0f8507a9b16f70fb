pub mod checkpoint;
pub mod collaborators;
pub mod grading;
pub mod graph;
pub mod orchestrator;
pub mod outbox;
pub mod snapshot;
pub mod stages;

pub use checkpoint::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
pub use collaborators::{CallPolicy, Collaborators};
pub use graph::{
    validate_resume, FeedbackRequest, GraphEngine, PendingDraft, RunOutcome, StageRegistry,
};
pub use orchestrator::{CampaignOrchestrator, CampaignRun};
pub use outbox::DirectoryPublisher;
pub use snapshot::Snapshot;
