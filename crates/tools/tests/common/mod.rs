#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use capflow_core::*;
use capflow_tools::PlainTextCodec;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Model that is never expected to be called by tool tests.
pub struct UnusedModel;

#[async_trait]
impl ModelClient for UnusedModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ModelError> {
        Err(ModelError::Api("model not available in tool tests".into()))
    }

    async fn complete_structured(
        &self,
        _system: &str,
        _user: &str,
        _temperature: Option<f32>,
    ) -> Result<serde_json::Value, ModelError> {
        Err(ModelError::Api("model not available in tool tests".into()))
    }

    async fn complete_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[serde_json::Value],
    ) -> Result<ModelTurn, ModelError> {
        Err(ModelError::Api("model not available in tool tests".into()))
    }
}

/// Knowledge index that returns canned hits and records requests.
#[derive(Default)]
pub struct FakeKnowledge {
    pub hits: Vec<ChunkHit>,
    pub requests: Mutex<Vec<SearchRequest>>,
}

#[async_trait]
impl KnowledgeIndex for FakeKnowledge {
    async fn search(&self, request: SearchRequest) -> Result<Vec<ChunkHit>, EngineError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.hits.clone())
    }
}

/// Approval gate with a fixed answer that counts how often it was asked.
pub struct CountingGate {
    approve: bool,
    pub asked: AtomicUsize,
}

impl CountingGate {
    pub fn new(approve: bool) -> Self {
        Self {
            approve,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApprovalGate for CountingGate {
    async fn request_approval(&self, _request: ApprovalRequest) -> ApprovalDecision {
        self.asked.fetch_add(1, Ordering::SeqCst);
        if self.approve {
            ApprovalDecision::approve()
        } else {
            ApprovalDecision::deny("denied in test")
        }
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub root: PathBuf,
    pub ctx: RunContext,
    pub events: Arc<CollectingEventSink>,
    pub gate: Arc<CountingGate>,
    pub knowledge: Arc<FakeKnowledge>,
    pub cancel: CancellationToken,
}

pub fn harness(approve: bool) -> Harness {
    harness_with_knowledge(approve, FakeKnowledge::default())
}

pub fn harness_with_knowledge(approve: bool, knowledge: FakeKnowledge) -> Harness {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let events = Arc::new(CollectingEventSink::new());
    let gate = Arc::new(CountingGate::new(approve));
    let knowledge = Arc::new(knowledge);
    let cancel = CancellationToken::new();

    let collab = Collaborators {
        model: Arc::new(UnusedModel),
        knowledge: knowledge.clone(),
        embedder: None,
        documents: Arc::new(PlainTextCodec::new("docx")),
        approvals: gate.clone(),
        history: Arc::new(InMemoryHistory::new()),
        events: events.clone(),
        model_config: ModelConfig::default(),
    };
    let ctx = RunContext::new("run-test", "session-test", collab, cancel.clone());

    Harness {
        dir,
        root,
        ctx,
        events,
        gate,
        knowledge,
        cancel,
    }
}

pub fn artifact_events(events: &CollectingEventSink) -> Vec<(String, ArtifactOperation)> {
    events
        .events()
        .into_iter()
        .filter_map(|e| match e.event {
            RunEvent::FileArtifact {
                path, operation, ..
            } => Some((path, operation)),
            _ => None,
        })
        .collect()
}
