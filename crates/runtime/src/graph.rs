//! Run state machine.
//!
//! Two nodes alternate: `host` decides (plan, fail, pick the next task or
//! synthesize the answer) and `capability` acts on the active task. The run
//! ends as soon as the host leaves it in a terminal status.

use crate::capabilities::{CapabilityRegistry, TaskUpdate};
use crate::config::RuntimeConfig;
use crate::planner::Planner;
use capflow_core::{
    ChatMessage, EngineError, PlanError, Run, RunContext, RunEvent, RunStatus, TaskStatus,
};
use tracing::{debug, info, warn};

const ANSWER_PROMPT: &str = "You are a helpful assistant. Write the final answer to the user's request \
using the execution trace and the collected output below. Be concise, mention files that were created \
or changed, and do not invent results that the trace does not show.";

pub struct RunGraph {
    planner: Planner,
    registry: CapabilityRegistry,
    max_steps: u32,
    history_max: usize,
}

fn internal(err: PlanError) -> EngineError {
    EngineError::Internal(err.to_string())
}

impl RunGraph {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            planner: Planner::new(config.planner.clone()),
            registry: CapabilityRegistry::new(config),
            max_steps: config.graph.max_steps,
            history_max: config.history.max_messages,
        }
    }

    /// Drive `run` until it reaches a terminal status. Cancellation comes
    /// back as `Err(EngineError::Cancelled)` with the run left as it was.
    pub async fn drive(&self, ctx: &RunContext, run: &mut Run) -> Result<(), EngineError> {
        let mut steps = 0u32;
        loop {
            ctx.ensure_active()?;
            if run.status.is_terminal() {
                return Ok(());
            }
            if steps >= self.max_steps {
                warn!(run_id = %run.run_id, steps, "Run hit the step limit");
                run.status = RunStatus::Failed;
                run.active_task_id = None;
                run.error = Some(format!("Run exceeded the limit of {} steps", self.max_steps));
                return Ok(());
            }
            steps += 1;
            debug!(run_id = %run.run_id, step = steps, "Host step");

            self.host_step(ctx, run).await?;
            if run.status.is_terminal() {
                return Ok(());
            }

            ctx.ensure_active()?;
            self.capability_step(ctx, run).await?;
        }
    }

    async fn host_step(&self, ctx: &RunContext, run: &mut Run) -> Result<(), EngineError> {
        if run.plan.is_empty() {
            run.plan = self.planner.plan(ctx, run).await?;
            ctx.emit(RunEvent::PlanCreated {
                tasks: run.plan.clone(),
            });
        }

        if let Some(failed) = run.plan.iter().find(|t| t.status == TaskStatus::Failed) {
            let error = failed
                .last_error
                .clone()
                .unwrap_or_else(|| format!("Task \"{}\" failed", failed.title));
            info!(run_id = %run.run_id, task_id = %failed.id, "Task failed, failing run");
            run.status = RunStatus::Failed;
            run.active_task_id = None;
            run.error = Some(error);
            return Ok(());
        }

        match run.next_task_id() {
            Some(task_id) => {
                let pending = run
                    .task(&task_id)
                    .map(|t| t.status == TaskStatus::Pending)
                    .unwrap_or(false);
                if pending {
                    run.start_task(&task_id).map_err(internal)?;
                    if let Some(task) = run.task(&task_id) {
                        ctx.emit(RunEvent::TaskStarted {
                            task_id: task.id.clone(),
                            title: task.title.clone(),
                            kind: task.kind.clone(),
                            attempt: task.attempts,
                        });
                    }
                }
                run.active_task_id = Some(task_id);
            }
            None => {
                let answer = self.synthesize(ctx, run).await?;
                info!(run_id = %run.run_id, "All tasks done, run completed");
                run.output = Some(answer);
                run.active_task_id = None;
                run.status = RunStatus::Completed;
            }
        }
        Ok(())
    }

    async fn capability_step(&self, ctx: &RunContext, run: &mut Run) -> Result<(), EngineError> {
        let Some(task) = run.active_task().cloned() else {
            return Ok(());
        };

        let update = self.registry.dispatch(ctx, run, &task).await?;
        match update {
            TaskUpdate::Completed {
                result_code,
                message,
                data,
                output,
            } => {
                run.complete_task(&task.id, result_code, message, data)
                    .map_err(internal)?;
                if let Some(text) = output {
                    run.append_output(&text);
                }
                run.active_task_id = None;
            }
            TaskUpdate::Failed {
                error,
                result_code,
                data,
            } => {
                run.fail_task(&task.id, error, result_code, data)
                    .map_err(internal)?;
                run.active_task_id = None;
            }
            TaskUpdate::Retry { error } => {
                let attempt = run.retry_task(&task.id, error).map_err(internal)?;
                debug!(task_id = %task.id, attempt, "Task will be retried");
            }
        }
        Ok(())
    }

    async fn synthesize(&self, ctx: &RunContext, run: &Run) -> Result<String, EngineError> {
        let history = ctx.load_history().await?;
        let skip = history.len().saturating_sub(self.history_max);

        let mut messages = Vec::with_capacity(history.len() - skip + 2);
        messages.push(ChatMessage::system(ANSWER_PROMPT));
        messages.extend(history.into_iter().skip(skip));
        messages.push(ChatMessage::user(format!(
            "Request: {}\n\nExecution trace:\n{}\n\nCollected output:\n{}",
            run.input,
            run.execution_trace(),
            run.output.as_deref().unwrap_or("(none)")
        )));

        let answer = ctx.complete(&messages).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(run
                .output
                .clone()
                .unwrap_or_else(|| run.execution_trace()));
        }
        Ok(answer.to_string())
    }
}
