#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use capflow_core::*;
use capflow_runtime::{RunService, RuntimeConfig, StartRunRequest};
use capflow_tools::PlainTextCodec;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Model that replays queued answers in order.
///
/// Tool turns and structured answers are separate queues. An exhausted tool
/// queue yields a plain-text turn; an exhausted structured queue is a parse
/// error.
#[derive(Default)]
pub struct ScriptedModel {
    turns: Mutex<VecDeque<ModelTurn>>,
    structured: Mutex<VecDeque<Value>>,
    answer: String,
    call_seq: AtomicUsize,
    pub tool_requests: Mutex<Vec<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            answer: "All done.".to_string(),
            ..Default::default()
        }
    }

    pub fn plan(self, tasks: Value) -> Self {
        self.structured(json!({ "tasks": tasks }))
    }

    pub fn structured(self, value: Value) -> Self {
        self.structured.lock().unwrap().push_back(value);
        self
    }

    pub fn judge(self, satisfied: bool, note: &str) -> Self {
        self.structured(json!({ "satisfied": satisfied, "note": note }))
    }

    pub fn call(self, name: &str, arguments: Value) -> Self {
        let id = format!("call_{}", self.call_seq.fetch_add(1, Ordering::SeqCst));
        self.turns.lock().unwrap().push_back(ModelTurn {
            content: None,
            tool_calls: vec![ToolCall {
                id,
                name: name.to_string(),
                arguments,
            }],
        });
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.turns.lock().unwrap().push_back(ModelTurn {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
        });
        self
    }

    pub fn answer(mut self, text: &str) -> Self {
        self.answer = text.to_string();
        self
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ModelError> {
        Ok(self.answer.clone())
    }

    async fn complete_structured(
        &self,
        _system: &str,
        _user: &str,
        _temperature: Option<f32>,
    ) -> Result<Value, ModelError> {
        self.structured
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::Parse("no scripted structured response".into()))
    }

    async fn complete_with_tools(
        &self,
        _messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelTurn, ModelError> {
        let names = tools
            .iter()
            .filter_map(|t| t["function"]["name"].as_str().map(str::to_string))
            .collect();
        self.tool_requests.lock().unwrap().push(names);
        Ok(self.turns.lock().unwrap().pop_front().unwrap_or(ModelTurn {
            content: Some("Nothing more to do.".into()),
            tool_calls: Vec::new(),
        }))
    }
}

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

pub struct FixedGate {
    approve: bool,
    pub asked: AtomicUsize,
}

impl FixedGate {
    pub fn new(approve: bool) -> Self {
        Self {
            approve,
            asked: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ApprovalGate for FixedGate {
    async fn request_approval(&self, _request: ApprovalRequest) -> ApprovalDecision {
        self.asked.fetch_add(1, Ordering::SeqCst);
        if self.approve {
            ApprovalDecision::approve()
        } else {
            ApprovalDecision::deny("Denied by test policy")
        }
    }
}

/// Gate that reports each request and then never decides.
pub struct BlockingGate {
    tx: mpsc::UnboundedSender<ApprovalRequest>,
}

impl BlockingGate {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ApprovalRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ApprovalGate for BlockingGate {
    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalDecision {
        let _ = self.tx.send(request);
        std::future::pending().await
    }
}

pub struct Env {
    pub dir: TempDir,
    pub root: PathBuf,
    pub events: Arc<CollectingEventSink>,
    pub model: Arc<ScriptedModel>,
    pub service: RunService,
}

pub struct EnvBuilder {
    model: ScriptedModel,
    gate: Arc<dyn ApprovalGate>,
    knowledge: FakeKnowledge,
    config: RuntimeConfig,
}

pub fn env(model: ScriptedModel) -> EnvBuilder {
    EnvBuilder {
        model,
        gate: Arc::new(FixedGate::new(true)),
        knowledge: FakeKnowledge::default(),
        config: RuntimeConfig::default(),
    }
}

impl EnvBuilder {
    pub fn gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn knowledge(mut self, knowledge: FakeKnowledge) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut RuntimeConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> Env {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let events = Arc::new(CollectingEventSink::new());
        let model = Arc::new(self.model);

        let collab = Collaborators {
            model: model.clone(),
            knowledge: Arc::new(self.knowledge),
            embedder: None,
            documents: Arc::new(PlainTextCodec::new("docx")),
            approvals: self.gate,
            history: Arc::new(InMemoryHistory::new()),
            events: events.clone(),
            model_config: ModelConfig::default(),
        };
        let service = RunService::new(&self.config, collab);

        Env {
            dir,
            root,
            events,
            model,
            service,
        }
    }
}

impl Env {
    pub fn request(&self, input: &str) -> StartRunRequest {
        StartRunRequest {
            run_id: "run-1".into(),
            session_id: "session-1".into(),
            input: input.into(),
            selected_document_ids: Vec::new(),
            workspace: Some(self.root.clone()),
        }
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.kinds()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().iter().filter(|k| **k == kind).count()
    }

    pub fn task_failures(&self) -> Vec<(ResultCode, String)> {
        self.events
            .events()
            .into_iter()
            .filter_map(|e| match e.event {
                RunEvent::TaskFailed {
                    result_code, error, ..
                } => Some((result_code, error)),
                _ => None,
            })
            .collect()
    }

    pub fn artifacts(&self) -> Vec<(String, ArtifactOperation)> {
        self.events
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
}

/// Fold the stream and check that at most one task is running at a time and
/// that task statuses only move forward.
pub fn assert_task_lifecycle(events: &[EventEnvelope]) {
    let mut status: HashMap<String, TaskStatus> = HashMap::new();
    let mut last_seq = None;

    for envelope in events {
        if let Some(prev) = last_seq {
            assert!(envelope.seq > prev, "seq must increase");
        }
        last_seq = Some(envelope.seq);

        match &envelope.event {
            RunEvent::PlanCreated { tasks } => {
                for task in tasks {
                    assert_eq!(task.status, TaskStatus::Pending);
                    status.insert(task.id.clone(), TaskStatus::Pending);
                }
            }
            RunEvent::TaskStarted { task_id, .. } => {
                assert_eq!(status.get(task_id), Some(&TaskStatus::Pending));
                status.insert(task_id.clone(), TaskStatus::Running);
            }
            RunEvent::TaskRetry { task_id, .. } => {
                assert_eq!(status.get(task_id), Some(&TaskStatus::Running));
            }
            RunEvent::TaskCompleted { task_id, .. } => {
                assert_eq!(status.get(task_id), Some(&TaskStatus::Running));
                status.insert(task_id.clone(), TaskStatus::Completed);
            }
            RunEvent::TaskFailed { task_id, .. } => {
                assert_eq!(status.get(task_id), Some(&TaskStatus::Running));
                status.insert(task_id.clone(), TaskStatus::Failed);
            }
            _ => {}
        }

        let running = status.values().filter(|s| **s == TaskStatus::Running).count();
        assert!(running <= 1, "more than one running task");
    }
}
