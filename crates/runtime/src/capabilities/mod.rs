//! Capability registry and task dispatch.

pub mod command;
pub mod document;
pub mod retrieval;

use crate::config::RuntimeConfig;
use crate::react::ToolLoopEnd;
use async_trait::async_trait;
use capflow_core::{
    BoundedLoopOutcome, CapabilityKind, EngineError, LoopStopReason, ResultCode, Run, RunContext,
    RunEvent, Task,
};
use std::sync::Arc;
use tracing::{info, warn};

pub use command::CommandExecutor;
pub use document::DocumentExecutor;
pub use retrieval::RetrievalExecutor;

/// What a capability asks the state machine to do with its task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Completed {
        result_code: ResultCode,
        message: Option<String>,
        data: Option<serde_json::Value>,
        /// Contribution to the run's running output text.
        output: Option<String>,
    },
    Failed {
        error: String,
        result_code: ResultCode,
        data: Option<serde_json::Value>,
    },
    /// Keep the task running and dispatch it again.
    Retry { error: String },
}

impl TaskUpdate {
    pub fn completed(message: impl Into<String>) -> Self {
        TaskUpdate::Completed {
            result_code: ResultCode::Ok,
            message: Some(message.into()),
            data: None,
            output: None,
        }
    }

    pub fn failed(result_code: ResultCode, error: impl Into<String>) -> Self {
        TaskUpdate::Failed {
            error: error.into(),
            result_code,
            data: None,
        }
    }

    pub fn with_data(mut self, value: serde_json::Value) -> Self {
        match &mut self {
            TaskUpdate::Completed { data, .. } | TaskUpdate::Failed { data, .. } => {
                *data = Some(value)
            }
            TaskUpdate::Retry { .. } => {}
        }
        self
    }
}

#[async_trait]
pub trait CapabilityExecutor: Send + Sync {
    fn kind(&self) -> CapabilityKind;

    async fn execute(&self, ctx: &RunContext, run: &Run, task: &Task)
        -> Result<TaskUpdate, EngineError>;
}

/// Fixed set of executors, one per capability kind.
pub struct CapabilityRegistry {
    retrieval: Arc<dyn CapabilityExecutor>,
    command: Arc<dyn CapabilityExecutor>,
    document: Arc<dyn CapabilityExecutor>,
}

impl CapabilityRegistry {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            retrieval: Arc::new(RetrievalExecutor::new(config.retrieval.clone())),
            command: Arc::new(CommandExecutor::new(config.command.clone())),
            document: Arc::new(DocumentExecutor::new(config.document.clone())),
        }
    }

    pub fn executor(&self, kind: CapabilityKind) -> &Arc<dyn CapabilityExecutor> {
        match kind {
            CapabilityKind::Retrieval => &self.retrieval,
            CapabilityKind::CommandExecution => &self.command,
            CapabilityKind::DocumentEditing => &self.document,
        }
    }

    /// Run one task and publish the matching task event.
    ///
    /// Only cancellation comes back as `Err`; every other failure is folded
    /// into a `TaskUpdate::Failed`.
    pub async fn dispatch(
        &self,
        ctx: &RunContext,
        run: &Run,
        task: &Task,
    ) -> Result<TaskUpdate, EngineError> {
        ctx.ensure_active()?;

        let update = match self.resolve(task) {
            Err(update) => update,
            Ok(kind) => {
                info!(task_id = %task.id, kind = kind.as_str(), attempt = task.attempts, "Dispatching task");
                match self.executor(kind).execute(ctx, run, task).await {
                    Ok(update) => update,
                    Err(e) if e.is_cancelled() || ctx.is_cancelled() => {
                        return Err(EngineError::Cancelled);
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "Capability failed");
                        TaskUpdate::failed(ResultCode::Failed, e.to_string())
                    }
                }
            }
        };

        ctx.ensure_active()?;
        emit_task_event(ctx, task, &update);
        Ok(update)
    }

    fn resolve(&self, task: &Task) -> Result<CapabilityKind, TaskUpdate> {
        let kind: CapabilityKind = task
            .kind
            .parse()
            .map_err(|e: String| TaskUpdate::failed(ResultCode::InvalidInput, e))?;

        if let Some(input) = &task.input {
            if input.kind() != kind {
                return Err(TaskUpdate::failed(
                    ResultCode::InvalidInput,
                    format!(
                        "Task input of kind {} does not match task kind {}",
                        input.kind().as_str(),
                        kind.as_str()
                    ),
                ));
            }
        }
        Ok(kind)
    }
}

fn emit_task_event(ctx: &RunContext, task: &Task, update: &TaskUpdate) {
    let event = match update {
        TaskUpdate::Completed {
            result_code,
            message,
            data,
            ..
        } => RunEvent::TaskCompleted {
            task_id: task.id.clone(),
            result_code: *result_code,
            message: message.clone(),
            data: data.clone(),
        },
        TaskUpdate::Failed {
            error,
            result_code,
            data,
        } => RunEvent::TaskFailed {
            task_id: task.id.clone(),
            result_code: *result_code,
            error: error.clone(),
            data: data.clone(),
        },
        TaskUpdate::Retry { error } => RunEvent::TaskRetry {
            task_id: task.id.clone(),
            attempt: task.attempts + 1,
            reason: error.clone(),
        },
    };
    ctx.emit(event);
}

/// Bound workspace root, or the `workspace_required` failure after emitting
/// its event.
pub(crate) fn require_workspace(
    ctx: &RunContext,
    run: &Run,
    task: &Task,
    capability: CapabilityKind,
) -> Result<std::path::PathBuf, TaskUpdate> {
    match &run.workspace {
        Some(binding) => Ok(binding.root.clone()),
        None => {
            let message = format!(
                "{} needs a workspace folder. Select one and try again.",
                capability.as_str()
            );
            ctx.emit(RunEvent::WorkspaceRequired {
                task_id: task.id.clone(),
                capability: capability.as_str().to_string(),
                message: message.clone(),
            });
            Err(TaskUpdate::failed(ResultCode::WorkspaceRequired, message))
        }
    }
}

/// Map a finish-driven tool loop onto a task update.
pub(crate) fn finish_loop_update(
    outcome: BoundedLoopOutcome<ToolLoopEnd>,
    data: serde_json::Value,
) -> TaskUpdate {
    match outcome {
        BoundedLoopOutcome::Completed {
            value: ToolLoopEnd::Finished(record),
            ..
        } => {
            if record.success && record.result_code == ResultCode::Ok {
                TaskUpdate::Completed {
                    result_code: ResultCode::Ok,
                    message: Some(record.summary.clone()),
                    data: Some(data),
                    output: Some(record.summary).filter(|s| !s.is_empty()),
                }
            } else {
                let result_code = match record.result_code {
                    ResultCode::Ok => ResultCode::Failed,
                    code => code,
                };
                let error = if record.summary.is_empty() {
                    format!("Task finished unsuccessfully ({})", result_code)
                } else {
                    record.summary
                };
                TaskUpdate::failed(result_code, error).with_data(data)
            }
        }
        BoundedLoopOutcome::Completed {
            value: ToolLoopEnd::Text(_),
            ..
        } => TaskUpdate::failed(
            ResultCode::Failed,
            "Model ended the task without calling finish",
        )
        .with_data(data),
        BoundedLoopOutcome::Exhausted { rounds, reason } => TaskUpdate::failed(
            ResultCode::BoundedLoopError,
            format!(
                "Tool loop stopped after {} rounds ({})",
                rounds,
                match reason {
                    LoopStopReason::Timeout => "timeout",
                    LoopStopReason::MaxSteps => "max_steps",
                }
            ),
        )
        .with_data(data),
    }
}
