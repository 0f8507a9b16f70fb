//! End-to-end runs of the campaign graph against scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use herald_agent::{
    CallPolicy, CampaignOrchestrator, Collaborators, GraphEngine, MemorySnapshotStore, RunOutcome,
};
use herald_core::config::WorkflowConfig;
use herald_core::prompts::REWRITER_ROLE;
use herald_core::types::{
    CampaignStatus, Decision, FeedbackInput, FeedbackStatus, LoopKind, RetrievalGrade, Stage,
    TransitionRecord, Verdict,
};
use herald_test_utils::{
    FailingPublisher, ScriptedClassifier, ScriptedGenerator, StaticRetriever,
    TestCollaborators, SNEAKER_GOAL,
};

fn engine(t: &TestCollaborators) -> GraphEngine {
    let collaborators = Collaborators::new(
        t.generator.clone(),
        t.retriever.clone(),
        t.classifier.clone(),
        t.publisher.clone(),
    );
    GraphEngine::new(collaborators, WorkflowConfig::default())
        .with_policy(CallPolicy::new(Duration::from_secs(5), 3))
}

fn orchestrator(t: &TestCollaborators) -> CampaignOrchestrator {
    CampaignOrchestrator::new(engine(t), Arc::new(MemorySnapshotStore::new()))
}

fn routed(journal: &[TransitionRecord], stage: Stage, decision: Decision) -> usize {
    journal
        .iter()
        .filter(|r| r.stage == stage && r.decision == decision)
        .count()
}

#[tokio::test]
async fn test_chitchat_never_plans_or_drafts() {
    let t = TestCollaborators::with_classifier(&["Email"], ScriptedClassifier::chitchat());
    let run = orchestrator(&t).start_campaign("hey, how's it going?").await.unwrap();

    assert_eq!(run.outcome, RunOutcome::Completed);
    assert_eq!(run.campaign.status, CampaignStatus::Aborted);
    assert_eq!(run.campaign.current_stage, Stage::End);
    assert!(run.campaign.plan.is_empty());
    assert!(t.generator.prompts().is_empty());
    assert!(t.retriever.queries().is_empty());
    assert_eq!(run.campaign.journal.len(), 1);
    assert_eq!(run.campaign.journal[0].decision, Decision::Chitchat);
}

#[tokio::test]
async fn test_sneaker_launch_with_one_revision() {
    let t = TestCollaborators::happy(&["Email", "Social Post"]);
    let orch = orchestrator(&t);

    let first = orch.start_campaign(SNEAKER_GOAL).await.unwrap();
    let RunOutcome::Suspended(request) = &first.outcome else {
        panic!("expected suspension, got {:?}", first.outcome);
    };
    let pending: Vec<_> = request.pending.iter().map(|p| p.index).collect();
    assert_eq!(pending, vec![0, 1]);
    assert_eq!(request.pending[1].asset_type, "Social Post");
    assert_eq!(t.generator.draft_count(), 2);

    // Approve the email, send the social post back.
    let second = orch
        .resume_latest(
            &first.campaign_id,
            FeedbackInput::new().approve(0).revise(1, "shorter"),
        )
        .await
        .unwrap();
    let campaign = &second.campaign;
    assert!(second.outcome.is_suspended());
    assert_eq!(campaign.plan[0].feedback_status, FeedbackStatus::Approved);
    assert_eq!(campaign.plan[1].feedback_status, FeedbackStatus::Pending);
    assert_eq!(campaign.pending_review(), vec![1]);

    let revision = campaign
        .journal
        .iter()
        .find(|r| r.decision == Decision::NeedsRevision)
        .expect("needs_revision routed");
    assert_eq!(revision.stage, Stage::FeedbackProcessor);
    assert_eq!(revision.next, Stage::Retriever);

    let writer_prompts = t.generator.writer_prompts();
    assert_eq!(writer_prompts.len(), 3);
    assert!(writer_prompts[2].contains("Asset Type: Social Post"));
    assert!(writer_prompts[2].contains("shorter"));
    assert!(!writer_prompts[0].contains("shorter"));
    // The note is cleared once the redraft is back for review; the email
    // draft is untouched.
    assert!(campaign.plan[1].feedback_note.is_none());
    assert_eq!(campaign.plan[0].draft, first.campaign.plan[0].draft);
    assert_ne!(campaign.plan[1].draft, first.campaign.plan[1].draft);

    let done = orch
        .resume_latest(&first.campaign_id, FeedbackInput::approve_all([0, 1]))
        .await
        .unwrap();
    assert_eq!(done.outcome, RunOutcome::Completed);
    assert_eq!(done.campaign.status, CampaignStatus::Done);
    assert_eq!(done.campaign.current_asset_index, 2);

    let journal = &done.campaign.journal;
    assert_eq!(routed(journal, Stage::FeedbackProcessor, Decision::AllApproved), 1);
    assert_eq!(routed(journal, Stage::Reviewer, Decision::Reviewed), 1);
    assert_eq!(routed(journal, Stage::Publisher, Decision::Success), 1);

    let docs = t.publisher.documents();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].title, format!("{} - Email", SNEAKER_GOAL));
    assert_eq!(docs[1].title, format!("{} - Social Post", SNEAKER_GOAL));
    assert!(done.campaign.plan.iter().all(|task| task.document.is_some()));
    assert!(done.campaign.critique.as_deref().unwrap().contains("Email Review"));
}

#[tokio::test]
async fn test_revision_note_survives_hallucination_retry() {
    let classifier = ScriptedClassifier::approving().with_grounding(vec![
        Verdict::Grounded,
        Verdict::Grounded,
        Verdict::Hallucinated,
    ]);
    let t = TestCollaborators::with_classifier(&["Email", "Social Post"], classifier);
    let orch = orchestrator(&t);
    let first = orch.start_campaign(SNEAKER_GOAL).await.unwrap();

    let second = orch
        .resume_latest(
            &first.campaign_id,
            FeedbackInput::new().approve(0).revise(1, "shorter"),
        )
        .await
        .unwrap();
    assert!(second.outcome.is_suspended());

    let journal = &second.campaign.journal;
    assert_eq!(routed(journal, Stage::HallucinationGrader, Decision::Hallucinated), 1);

    // Both redrafts of the social post carry the note, including the one
    // written after the grader rejected the first.
    let writer_prompts = t.generator.writer_prompts();
    assert_eq!(writer_prompts.len(), 4);
    assert!(writer_prompts[2].contains("shorter"));
    assert!(writer_prompts[3].contains("Asset Type: Social Post"));
    assert!(writer_prompts[3].contains("shorter"));

    let task = &second.campaign.plan[1];
    assert_eq!(task.draft.as_deref(), Some("Social Post draft #4"));
    assert_eq!(task.feedback_status, FeedbackStatus::Pending);
    assert!(task.feedback_note.is_none());
}

#[tokio::test]
async fn test_more_context_needed_re_retrieves_same_asset() {
    let classifier = ScriptedClassifier::approving()
        .with_grounding(vec![Verdict::MoreContextNeeded, Verdict::Grounded]);
    let t = TestCollaborators::with_classifier(&["Email", "Social Post"], classifier);
    let run = orchestrator(&t).start_campaign(SNEAKER_GOAL).await.unwrap();
    assert!(run.outcome.is_suspended());

    let journal = &run.campaign.journal;
    let at = journal
        .iter()
        .position(|r| r.decision == Decision::MoreContextNeeded)
        .expect("more_context_needed routed");
    assert_eq!(journal[at].stage, Stage::HallucinationGrader);
    assert_eq!(journal[at].next, Stage::Retriever);
    assert_eq!(journal[at].asset_index, Some(0));
    assert_eq!(journal[at + 1].stage, Stage::Retriever);
    assert_eq!(journal[at + 1].asset_index, Some(0));

    assert_eq!(run.campaign.retries.attempts(0, LoopKind::Hallucination), 1);
    assert_eq!(run.campaign.retries.attempts(1, LoopKind::Hallucination), 0);
    assert!(!run.campaign.plan[0].is_degraded());

    // Asset 0 is retrieved twice with the same query, asset 1 once.
    let queries = t.retriever.queries();
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[0], queries[1]);
    assert_ne!(queries[1], queries[2]);
    assert_eq!(t.generator.draft_count(), 3);
}

#[tokio::test]
async fn test_three_irrelevant_grades_force_forward() {
    let t = TestCollaborators::with_classifier(&["Email"], ScriptedClassifier::always_irrelevant());
    let run = orchestrator(&t).start_campaign(SNEAKER_GOAL).await.unwrap();

    assert!(run.outcome.is_suspended());
    let journal = &run.campaign.journal;
    assert_eq!(routed(journal, Stage::RetrievalGrader, Decision::Irrelevant), 2);
    assert_eq!(routed(journal, Stage::RetrievalGrader, Decision::Relevant), 1);
    assert_eq!(routed(journal, Stage::QueryRewriter, Decision::Rewritten), 2);

    let rewrites = t
        .generator
        .prompts()
        .iter()
        .filter(|p| p.starts_with(REWRITER_ROLE))
        .count();
    assert_eq!(rewrites, 2);

    let task = &run.campaign.plan[0];
    assert_eq!(task.grade_retrieval, RetrievalGrade::Irrelevant);
    assert_eq!(task.degraded.len(), 1);
    assert_eq!(task.degraded[0].loop_kind, LoopKind::Retrieval);
    assert_eq!(task.degraded[0].attempts, 3);
    assert_eq!(run.campaign.retries.attempts(0, LoopKind::Retrieval), 3);
    assert_eq!(task.query, "refined query 2");

    let RunOutcome::Suspended(request) = &run.outcome else {
        unreachable!()
    };
    assert!(request.pending[0].degraded);
}

#[tokio::test]
async fn test_hallucination_loop_is_bounded() {
    let t = TestCollaborators::with_classifier(
        &["Email"],
        ScriptedClassifier::always_hallucinated(),
    );
    let run = orchestrator(&t).start_campaign(SNEAKER_GOAL).await.unwrap();

    assert!(run.outcome.is_suspended());
    let journal = &run.campaign.journal;
    assert_eq!(routed(journal, Stage::HallucinationGrader, Decision::Hallucinated), 2);
    assert_eq!(routed(journal, Stage::HallucinationGrader, Decision::Grounded), 1);
    assert_eq!(t.generator.draft_count(), 3);
    assert!(run.campaign.plan[0].is_degraded());
}

#[tokio::test]
async fn test_publish_failure_keeps_drafts() {
    let t = TestCollaborators::happy(&["Email", "Blog Post"]);
    let failing = Arc::new(FailingPublisher::new("docs API returned 403"));
    let collaborators = Collaborators::new(
        t.generator.clone(),
        t.retriever.clone(),
        t.classifier.clone(),
        failing,
    );
    let engine = GraphEngine::new(collaborators, WorkflowConfig::default())
        .with_policy(CallPolicy::new(Duration::from_secs(5), 3));
    let orch = CampaignOrchestrator::new(engine, Arc::new(MemorySnapshotStore::new()));

    let run = orch.start_campaign(SNEAKER_GOAL).await.unwrap();
    let done = orch
        .resume_latest(&run.campaign_id, FeedbackInput::approve_all([0, 1]))
        .await
        .unwrap();

    let RunOutcome::Failed(reason) = &done.outcome else {
        panic!("expected failure, got {:?}", done.outcome);
    };
    assert!(reason.contains("docs API returned 403"));
    assert_eq!(done.campaign.status, CampaignStatus::Aborted);
    assert_eq!(done.campaign.current_stage, Stage::Aborted);
    assert_eq!(
        routed(&done.campaign.journal, Stage::Publisher, Decision::Failure),
        1
    );

    // The stored snapshot still carries every draft for manual recovery.
    let stored = orch.load(&run.campaign_id).unwrap().unwrap();
    assert!(stored.plan.iter().all(|task| task.draft.is_some()));
    assert_eq!(stored.status, CampaignStatus::Aborted);
}

#[tokio::test]
async fn test_unavailable_generator_aborts_run() {
    let mut t = TestCollaborators::happy(&["Email"]);
    t.generator = Arc::new(ScriptedGenerator::unavailable());
    let run = orchestrator(&t).start_campaign(SNEAKER_GOAL).await.unwrap();

    let RunOutcome::Failed(reason) = &run.outcome else {
        panic!("expected failure, got {:?}", run.outcome);
    };
    assert!(reason.contains("Generation unavailable"));
    assert_eq!(run.campaign.status, CampaignStatus::Aborted);
    // A 401 is not transient: one planner call, no retries.
    assert_eq!(t.generator.prompts().len(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let mut t = TestCollaborators::happy(&["Email"]);
    t.generator = Arc::new(ScriptedGenerator::for_plan(&["Email"]).failing_first(2));
    let run = orchestrator(&t).start_campaign(SNEAKER_GOAL).await.unwrap();

    assert!(run.outcome.is_suspended());
    assert_eq!(run.campaign.plan.len(), 1);
}

#[tokio::test]
async fn test_retrieval_timeout_is_retried() {
    let mut t = TestCollaborators::happy(&["Email"]);
    t.retriever = Arc::new(
        StaticRetriever::new(vec!["recycled ocean plastic"])
            .with_delay(1, Duration::from_millis(500)),
    );
    let collaborators = Collaborators::new(
        t.generator.clone(),
        t.retriever.clone(),
        t.classifier.clone(),
        t.publisher.clone(),
    );
    let engine = GraphEngine::new(collaborators, WorkflowConfig::default())
        .with_policy(CallPolicy::new(Duration::from_millis(50), 2));

    let mut campaign = herald_core::campaign::Campaign::new(SNEAKER_GOAL).unwrap();
    let outcome = engine.advance(&mut campaign, None).await.unwrap();
    assert!(outcome.is_suspended());
    assert_eq!(t.retriever.queries().len(), 2);
    assert_eq!(campaign.plan[0].retrieved_context, vec!["recycled ocean plastic"]);
}

#[tokio::test]
async fn test_cancelled_run_aborts_before_next_stage() {
    let t = TestCollaborators::happy(&["Email"]);
    let engine = engine(&t);
    engine.cancellation_token().cancel();

    let mut campaign = herald_core::campaign::Campaign::new(SNEAKER_GOAL).unwrap();
    let outcome = engine.advance(&mut campaign, None).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed("Campaign cancelled".into()));
    assert_eq!(campaign.status, CampaignStatus::Aborted);
    assert!(campaign.journal.is_empty());
    assert!(t.generator.prompts().is_empty());
}

#[tokio::test]
async fn test_failing_compliance_still_publishes() {
    let classifier = ScriptedClassifier::approving().with_compliance(
        Verdict::Fail {
            critique: "Uses the word 'cheap'.".into(),
        },
    );
    let t = TestCollaborators::with_classifier(&["Email"], classifier);
    let orch = orchestrator(&t);
    let run = orch.start_campaign(SNEAKER_GOAL).await.unwrap();
    let done = orch
        .resume_latest(&run.campaign_id, FeedbackInput::approve_all([0]))
        .await
        .unwrap();

    assert_eq!(done.outcome, RunOutcome::Completed);
    let compliance = done.campaign.plan[0].compliance.as_ref().unwrap();
    assert!(!compliance.passed);
    assert!(done.campaign.critique.as_deref().unwrap().contains("cheap"));
    assert_eq!(t.publisher.documents().len(), 1);
}
