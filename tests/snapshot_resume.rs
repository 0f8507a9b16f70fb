//! Snapshot persistence and the resume boundary.

use std::sync::Arc;
use std::time::Duration;

use herald_agent::{
    CallPolicy, CampaignOrchestrator, Collaborators, GraphEngine, MemorySnapshotStore, Snapshot,
    SnapshotStore, SqliteSnapshotStore,
};
use herald_core::config::WorkflowConfig;
use herald_core::error::HeraldError;
use herald_core::types::{CampaignStatus, FeedbackInput, TransitionRecord};
use herald_test_utils::{ScriptedClassifier, TestCollaborators, SNEAKER_GOAL};

fn orchestrator(t: &TestCollaborators, store: Arc<dyn SnapshotStore>) -> CampaignOrchestrator {
    let collaborators = Collaborators::new(
        t.generator.clone(),
        t.retriever.clone(),
        t.classifier.clone(),
        t.publisher.clone(),
    );
    let engine = GraphEngine::new(collaborators, WorkflowConfig::default())
        .with_policy(CallPolicy::new(Duration::from_secs(5), 1));
    CampaignOrchestrator::new(engine, store)
}

/// Resume `snapshot` against fresh, identically scripted collaborators.
async fn replay(snapshot: &Snapshot, input: FeedbackInput) -> Vec<TransitionRecord> {
    let t = TestCollaborators::with_classifier(
        &["Email", "Social Post"],
        ScriptedClassifier::approving(),
    );
    let orch = orchestrator(&t, Arc::new(MemorySnapshotStore::new()));
    orch.resume_campaign(snapshot, input)
        .await
        .unwrap()
        .campaign
        .journal
}

#[tokio::test]
async fn test_round_trip_reproduces_routing() {
    let t = TestCollaborators::happy(&["Email", "Social Post"]);
    let orch = orchestrator(&t, Arc::new(MemorySnapshotStore::new()));
    let run = orch.start_campaign(SNEAKER_GOAL).await.unwrap();

    // Through the wire format and back.
    let raw = run.snapshot.clone().into_string();
    let reloaded = Snapshot::from_string(raw);
    assert_eq!(reloaded.restore().unwrap(), run.campaign);

    let input = FeedbackInput::new().approve(0).revise(1, "shorter");
    let a = replay(&run.snapshot, input.clone()).await;
    let b = replay(&reloaded, input).await;
    assert_eq!(a, b);
    assert!(a.len() > run.campaign.journal.len());
    assert_eq!(&a[..run.campaign.journal.len()], &run.campaign.journal[..]);
}

#[tokio::test]
async fn test_consumed_snapshot_rejected_without_side_effects() {
    let t = TestCollaborators::happy(&["Email"]);
    let store = Arc::new(MemorySnapshotStore::new());
    let orch = orchestrator(&t, store.clone());
    let run = orch.start_campaign(SNEAKER_GOAL).await.unwrap();

    let done = orch
        .resume_campaign(&run.snapshot, FeedbackInput::approve_all([0]))
        .await
        .unwrap();
    assert_eq!(done.campaign.status, CampaignStatus::Done);
    let published = t.publisher.documents().len();

    let err = orch
        .resume_campaign(&run.snapshot, FeedbackInput::approve_all([0]))
        .await
        .unwrap_err();
    assert!(matches!(err, HeraldError::InvalidResumeInput(_)));
    assert_eq!(t.publisher.documents().len(), published);
    let latest = store.load_latest(&run.campaign_id).unwrap().unwrap();
    assert_eq!(latest, done.snapshot);
}

#[tokio::test]
async fn test_non_suspended_snapshot_rejected() {
    let t = TestCollaborators::happy(&["Email"]);
    let orch = orchestrator(&t, Arc::new(MemorySnapshotStore::new()));
    let run = orch.start_campaign(SNEAKER_GOAL).await.unwrap();
    let done = orch
        .resume_latest(&run.campaign_id, FeedbackInput::approve_all([0]))
        .await
        .unwrap();

    let err = orch
        .resume_campaign(&done.snapshot, FeedbackInput::approve_all([0]))
        .await
        .unwrap_err();
    assert!(matches!(err, HeraldError::InvalidResumeInput(_)));
}

#[tokio::test]
async fn test_out_of_range_index_rejected() {
    let t = TestCollaborators::happy(&["Email"]);
    let orch = orchestrator(&t, Arc::new(MemorySnapshotStore::new()));
    let run = orch.start_campaign(SNEAKER_GOAL).await.unwrap();

    for input in [
        FeedbackInput::new().approve(3),
        FeedbackInput::new(),
        FeedbackInput::new().revise(0, "   "),
    ] {
        let err = orch.resume_campaign(&run.snapshot, input).await.unwrap_err();
        assert!(matches!(err, HeraldError::InvalidResumeInput(_)));
    }
    let stored = orch.load(&run.campaign_id).unwrap().unwrap();
    assert_eq!(stored, run.campaign);
}

#[tokio::test]
async fn test_sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("campaigns.db");

    let t = TestCollaborators::happy(&["Email"]);
    let campaign_id = {
        let store = Arc::new(SqliteSnapshotStore::open(&path).unwrap());
        let orch = orchestrator(&t, store);
        orch.start_campaign(SNEAKER_GOAL).await.unwrap().campaign_id
    };

    let store = Arc::new(SqliteSnapshotStore::open(&path).unwrap());
    let listed = store.list().unwrap();
    assert_eq!(listed, vec![(campaign_id.clone(), "awaiting_feedback".to_string())]);

    let orch = orchestrator(&t, store);
    let suspended = orch.store().load_latest(&campaign_id).unwrap().unwrap();
    let done = orch
        .resume_latest(&campaign_id, FeedbackInput::approve_all([0]))
        .await
        .unwrap();
    assert!(done.outcome.is_completed());

    let err = orch
        .resume_campaign(&suspended, FeedbackInput::approve_all([0]))
        .await
        .unwrap_err();
    assert!(matches!(err, HeraldError::InvalidResumeInput(_)));
}
