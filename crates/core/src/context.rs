//! Per-run facade over the collaborators.
//!
//! One `RunContext` is built for every run; nothing in it is process-global,
//! so concurrent runs and tests each get their own collaborators.

use crate::collab::{
    ApprovalDecision, ApprovalGate, ApprovalRequest, ChatMessage, DocumentCodec, Embedder,
    HistoryStore, KnowledgeIndex, ModelClient, ModelConfig, ModelTurn,
};
use crate::error::EngineError;
use crate::event::{EventEnvelope, EventSink, RunEvent};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Shared handles a run needs. Cheap to clone.
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn ModelClient>,
    pub knowledge: Arc<dyn KnowledgeIndex>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub documents: Arc<dyn DocumentCodec>,
    pub approvals: Arc<dyn ApprovalGate>,
    pub history: Arc<dyn HistoryStore>,
    pub events: Arc<dyn EventSink>,
    pub model_config: ModelConfig,
}

/// Cancels a run in step with its event stream: once `cancel` returns, no
/// task or tool event of that run can be published.
#[derive(Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    emit_lock: Arc<Mutex<()>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _guard = self.emit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Clone)]
pub struct RunContext {
    run_id: String,
    session_id: String,
    cancel: CancellationToken,
    collab: Collaborators,
    seq: Arc<AtomicU64>,
    // Held across the cancellation check and the sink call in `emit`.
    emit_lock: Arc<Mutex<()>>,
}

impl RunContext {
    pub fn new(
        run_id: impl Into<String>,
        session_id: impl Into<String>,
        collab: Collaborators,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            cancel,
            collab,
            seq: Arc::new(AtomicU64::new(0)),
            emit_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel.clone(),
            emit_lock: Arc::clone(&self.emit_lock),
        }
    }

    /// Cancellation check used at every node transition and tool entry.
    pub fn ensure_active(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.collab.model_config
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeIndex> {
        &self.collab.knowledge
    }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.collab.embedder.as_ref()
    }

    pub fn documents(&self) -> &Arc<dyn DocumentCodec> {
        &self.collab.documents
    }

    /// Publish an event. After cancellation only run lifecycle events get
    /// through. A cancel through [`CancelHandle`] cannot land between the
    /// check and the send.
    pub fn emit(&self, event: RunEvent) {
        let _guard = self.emit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() && !event.is_run_lifecycle() {
            tracing::debug!(run_id = %self.run_id, kind = event.kind(), "Dropping event after cancellation");
            return;
        }
        let envelope = EventEnvelope {
            run_id: self.run_id.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            at: chrono::Utc::now(),
            event,
        };
        self.collab.events.emit(envelope);
    }

    /// Await an external call, bailing out as soon as the run is cancelled.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        self.ensure_active()?;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            result = fut => result,
        };
        self.ensure_active()?;
        result
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, EngineError> {
        self.guard(async {
            self.collab
                .model
                .complete(messages)
                .await
                .map_err(EngineError::from)
        })
        .await
    }

    pub async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> Result<serde_json::Value, EngineError> {
        self.guard(async {
            self.collab
                .model
                .complete_structured(system, user, temperature)
                .await
                .map_err(EngineError::from)
        })
        .await
    }

    pub async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<ModelTurn, EngineError> {
        self.guard(async {
            self.collab
                .model
                .complete_with_tools(messages, tools)
                .await
                .map_err(EngineError::from)
        })
        .await
    }

    pub async fn load_history(&self) -> Result<Vec<ChatMessage>, EngineError> {
        self.guard(self.collab.history.load(&self.session_id)).await
    }

    /// Route a risky operation through the approval gate, emitting the
    /// request and the decision.
    pub async fn request_approval(
        &self,
        task_id: &str,
        request: ApprovalRequest,
    ) -> Result<ApprovalDecision, EngineError> {
        self.ensure_active()?;
        let request_id = uuid::Uuid::new_v4().to_string();
        self.emit(RunEvent::ApprovalRequired {
            task_id: task_id.to_string(),
            request_id: request_id.clone(),
            command: request.command.clone(),
            risk_level: request.risk_level,
            reason: request.reason.clone(),
        });

        let gate: &Arc<dyn ApprovalGate> = &self.collab.approvals;
        let decision = self
            .guard(async { Ok(gate.request_approval(request).await) })
            .await?;

        self.emit(RunEvent::ApprovalDecided {
            task_id: task_id.to_string(),
            request_id,
            approved: decision.approved,
            reason: decision.reason.clone(),
        });
        Ok(decision)
    }
}
