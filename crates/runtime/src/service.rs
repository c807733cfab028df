//! Run trigger: start, cancel and drive runs to a terminal status.

use crate::config::RuntimeConfig;
use crate::error::ServiceError;
use crate::graph::RunGraph;
use capflow_core::{
    CancelHandle, Collaborators, Run, RunContext, RunEvent, RunStatus, WorkspaceBinding,
};
use capflow_policy::canonical_root;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const CANCELLED_MESSAGE: &str = "Run cancelled.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRunRequest {
    /// Caller-chosen id; a fresh one is generated when empty.
    #[serde(default)]
    pub run_id: String,
    pub session_id: String,
    pub input: String,
    #[serde(default)]
    pub selected_document_ids: Vec<String>,
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
}

/// Terminal run state plus the message shown to the user.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: Run,
    pub final_message: String,
}

struct PreparedRun {
    run: Run,
    ctx: RunContext,
}

type RunTable = Arc<Mutex<HashMap<String, CancelHandle>>>;

#[derive(Clone)]
pub struct RunService {
    collab: Collaborators,
    graph: Arc<RunGraph>,
    runs: RunTable,
}

impl RunService {
    pub fn new(config: &RuntimeConfig, collab: Collaborators) -> Self {
        Self {
            collab,
            graph: Arc::new(RunGraph::new(config)),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate the request and run it in the background.
    pub fn start(&self, request: StartRunRequest) -> Result<StartRunResponse, ServiceError> {
        let prepared = self.prepare(request)?;
        let run_id = prepared.run.run_id.clone();
        let service = self.clone();
        tokio::spawn(async move {
            service.drive(prepared).await;
        });
        Ok(StartRunResponse { run_id })
    }

    /// Validate the request and run it to completion on the caller's task.
    pub async fn execute(&self, request: StartRunRequest) -> Result<RunOutcome, ServiceError> {
        let prepared = self.prepare(request)?;
        Ok(self.drive(prepared).await)
    }

    pub fn cancel(&self, run_id: &str) -> CancelResponse {
        let handle = self.table().get(run_id).cloned();
        match handle {
            Some(handle) => {
                info!(run_id, "Cancelling run");
                handle.cancel();
                CancelResponse { success: true }
            }
            None => {
                warn!(run_id, "Cancel requested for unknown run");
                CancelResponse { success: false }
            }
        }
    }

    pub fn is_running(&self, run_id: &str) -> bool {
        self.table().contains_key(run_id)
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancelHandle>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prepare(&self, request: StartRunRequest) -> Result<PreparedRun, ServiceError> {
        let input = request.input.trim();
        if input.is_empty() {
            return Err(ServiceError::EmptyInput);
        }

        let workspace = match &request.workspace {
            Some(path) => Some(WorkspaceBinding::new(
                canonical_root(path).map_err(|e| ServiceError::InvalidWorkspace(e.to_string()))?,
            )),
            None => None,
        };

        let run_id = if request.run_id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            request.run_id.trim().to_string()
        };

        let ctx = RunContext::new(
            run_id.clone(),
            request.session_id.clone(),
            self.collab.clone(),
            CancellationToken::new(),
        );
        {
            let mut table = self.table();
            if table.contains_key(&run_id) {
                return Err(ServiceError::AlreadyRunning(run_id));
            }
            table.insert(run_id.clone(), ctx.cancel_handle());
        }

        let mut run = Run::new(run_id, request.session_id, input);
        run.selected_document_ids = request.selected_document_ids;
        run.workspace = workspace;
        Ok(PreparedRun { run, ctx })
    }

    async fn drive(&self, prepared: PreparedRun) -> RunOutcome {
        let PreparedRun { mut run, ctx } = prepared;

        info!(run_id = %run.run_id, session_id = %run.session_id, "Run started");
        ctx.emit(RunEvent::RunStarted {
            session_id: run.session_id.clone(),
            input: run.input.clone(),
        });

        match self.graph.drive(&ctx, &mut run).await {
            Err(e) if e.is_cancellation_like() || ctx.is_cancelled() => {
                run.status = RunStatus::Cancelled;
                run.active_task_id = None;
            }
            Err(e) => {
                error!(run_id = %run.run_id, error = %e, "Run aborted");
                run.status = RunStatus::Failed;
                run.active_task_id = None;
                run.error = Some(e.to_string());
            }
            Ok(()) if !run.status.is_terminal() => {
                run.status = RunStatus::Failed;
                run.error = Some("Run stopped before reaching a terminal status".to_string());
            }
            Ok(()) => {}
        }

        let final_message = match run.status {
            RunStatus::Completed => {
                let output = run.output.clone().unwrap_or_default();
                ctx.emit(RunEvent::RunCompleted {
                    output: output.clone(),
                });
                output
            }
            RunStatus::Cancelled => {
                ctx.emit(RunEvent::RunCancelled {
                    message: CANCELLED_MESSAGE.to_string(),
                });
                CANCELLED_MESSAGE.to_string()
            }
            RunStatus::Failed | RunStatus::Running => {
                let error = run.error.clone().unwrap_or_else(|| "Unknown error".to_string());
                ctx.emit(RunEvent::RunFailed {
                    error: error.clone(),
                });
                format!("The request could not be completed: {}", error)
            }
        };
        info!(run_id = %run.run_id, status = ?run.status, "Run finished");

        self.table().remove(&run.run_id);
        RunOutcome { run, final_message }
    }
}
