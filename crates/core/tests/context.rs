#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use capflow_core::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Model that never answers.
struct HangingModel;

#[async_trait]
impl ModelClient for HangingModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ModelError> {
        std::future::pending().await
    }

    async fn complete_structured(
        &self,
        _system: &str,
        _user: &str,
        _temperature: Option<f32>,
    ) -> Result<serde_json::Value, ModelError> {
        std::future::pending().await
    }

    async fn complete_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[serde_json::Value],
    ) -> Result<ModelTurn, ModelError> {
        std::future::pending().await
    }
}

struct NoKnowledge;

#[async_trait]
impl KnowledgeIndex for NoKnowledge {
    async fn search(&self, _request: SearchRequest) -> Result<Vec<ChunkHit>, EngineError> {
        Ok(Vec::new())
    }
}

struct NoDocuments;

#[async_trait]
impl DocumentCodec for NoDocuments {
    fn extension(&self) -> &str {
        "docx"
    }

    async fn read_text(&self, _path: &Path) -> Result<String, EngineError> {
        Err(EngineError::Document("unsupported".into()))
    }

    async fn write_text(&self, _path: &Path, _text: &str) -> Result<(), EngineError> {
        Err(EngineError::Document("unsupported".into()))
    }
}

struct FixedGate(bool);

#[async_trait]
impl ApprovalGate for FixedGate {
    async fn request_approval(&self, _request: ApprovalRequest) -> ApprovalDecision {
        if self.0 {
            ApprovalDecision::approve()
        } else {
            ApprovalDecision::deny("no")
        }
    }
}

fn context(approve: bool) -> (RunContext, Arc<CollectingEventSink>, CancellationToken) {
    let events = Arc::new(CollectingEventSink::new());
    let collab = Collaborators {
        model: Arc::new(HangingModel),
        knowledge: Arc::new(NoKnowledge),
        embedder: None,
        documents: Arc::new(NoDocuments),
        approvals: Arc::new(FixedGate(approve)),
        history: Arc::new(InMemoryHistory::new()),
        events: events.clone(),
        model_config: ModelConfig::default(),
    };
    let cancel = CancellationToken::new();
    let ctx = RunContext::new("run-1", "session-1", collab, cancel.clone());
    (ctx, events, cancel)
}

#[tokio::test]
async fn test_events_carry_increasing_seq() {
    let (ctx, events, _) = context(true);
    ctx.emit(RunEvent::RunStarted {
        session_id: "session-1".into(),
        input: "hi".into(),
    });
    ctx.emit(RunEvent::PlanCreated { tasks: vec![] });

    let seqs: Vec<u64> = events.events().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![0, 1]);
    assert!(events.events().iter().all(|e| e.run_id == "run-1"));
}

#[tokio::test]
async fn test_only_lifecycle_events_after_cancel() {
    let (ctx, events, cancel) = context(true);
    cancel.cancel();

    ctx.emit(RunEvent::TaskStarted {
        task_id: "t".into(),
        title: "t".into(),
        kind: "retrieval".into(),
        attempt: 1,
    });
    ctx.emit(RunEvent::RunCancelled {
        message: "Run cancelled.".into(),
    });

    assert_eq!(events.kinds(), vec!["run_cancelled"]);
    assert!(ctx.ensure_active().unwrap_err().is_cancelled());
}

#[test]
fn test_no_task_event_lands_after_cancel_handle_returns() {
    let (ctx, events, _) = context(true);
    let handle = ctx.cancel_handle();
    let seen_at_cancel = std::thread::scope(|scope| {
        for worker in 0..4 {
            let ctx = ctx.clone();
            scope.spawn(move || {
                for i in 0..500 {
                    ctx.emit(RunEvent::TaskStarted {
                        task_id: format!("w{}-{}", worker, i),
                        title: "t".into(),
                        kind: "retrieval".into(),
                        attempt: 1,
                    });
                }
            });
        }
        std::thread::sleep(Duration::from_millis(2));
        handle.cancel();
        events.events().len()
    });

    assert!(handle.is_cancelled());
    assert!(ctx.is_cancelled());
    assert_eq!(events.events().len(), seen_at_cancel);
}

#[tokio::test]
async fn test_pending_model_call_unblocks_on_cancel() {
    let (ctx, _, cancel) = context(true);
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        ctx.complete(&[ChatMessage::user("hello")]),
    )
    .await
    .unwrap();
    assert!(result.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_approval_emits_request_and_decision() {
    let (ctx, events, _) = context(false);
    let decision = ctx
        .request_approval(
            "task-1",
            ApprovalRequest {
                command: "rm draft.txt".into(),
                risk_level: RiskLevel::Medium,
                reason: "delete".into(),
            },
        )
        .await
        .unwrap();

    assert!(!decision.approved);
    assert_eq!(events.kinds(), vec!["approval_required", "approval_decided"]);

    let all = events.events();
    let (first, second) = (&all[0].event, &all[1].event);
    match (first, second) {
        (
            RunEvent::ApprovalRequired { request_id: a, .. },
            RunEvent::ApprovalDecided {
                request_id: b,
                approved,
                ..
            },
        ) => {
            assert_eq!(a, b);
            assert!(!approved);
        }
        other => panic!("unexpected events: {:?}", other),
    }
}
