//! Command-execution capability: a `run_command` + `finish` tool loop inside
//! the bound workspace.

use super::{finish_loop_update, require_workspace, CapabilityExecutor, TaskUpdate};
use crate::config::CommandConfig;
use crate::react::{run_tool_loop, ToolLoopSpec};
use async_trait::async_trait;
use capflow_core::{
    CapabilityInput, CapabilityKind, EngineError, ResultCode, Run, RunContext, Task,
};
use capflow_policy::resolve_within_workspace;
use capflow_tools::{CommandToolConfig, FinishSlot, FinishTool, RunCommandTool, ToolRegistry};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const SYSTEM_PROMPT: &str = "You operate a shell inside a sandboxed workspace folder. \
Use run_command to execute one shell command at a time and inspect its output before the next step. \
Commands must stay inside the workspace: no '..' and no absolute paths outside it. \
Risky commands may be refused by the user; when that happens, stop. \
When the objective is done, or cannot be done, call finish with a short summary. \
A plain text answer does not finish the task.";

pub struct CommandExecutor {
    config: CommandConfig,
}

impl CommandExecutor {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CapabilityExecutor for CommandExecutor {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::CommandExecution
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        run: &Run,
        task: &Task,
    ) -> Result<TaskUpdate, EngineError> {
        ctx.ensure_active()?;
        let root = match require_workspace(ctx, run, task, self.kind()) {
            Ok(root) => root,
            Err(update) => return Ok(update),
        };

        let preferred_cwd = match &task.input {
            Some(CapabilityInput::CommandExecution {
                preferred_cwd: Some(cwd),
                ..
            }) if !cwd.trim().is_empty() => Some(cwd.trim().to_string()),
            _ => None,
        };
        let default_cwd = match preferred_cwd {
            Some(raw) => match resolve_within_workspace(&root, &root, &raw) {
                Ok(path) if path.is_dir() => path,
                Ok(path) => {
                    return Ok(TaskUpdate::failed(
                        ResultCode::InvalidInput,
                        format!("Working directory does not exist: {}", path.display()),
                    ))
                }
                Err(e) => return Ok(TaskUpdate::failed(ResultCode::InvalidInput, e.to_string())),
            },
            None => root.clone(),
        };

        let finish = FinishSlot::new();
        let run_command = Arc::new(RunCommandTool::new(
            CommandToolConfig {
                task_id: task.id.clone(),
                workspace_root: root.clone(),
                default_cwd: default_cwd.clone(),
                command_timeout_ms: self.config.command_timeout_ms,
                max_output_bytes: self.config.max_output_bytes,
            },
            finish.clone(),
        ));
        let registry = ToolRegistry::new()
            .with(run_command.clone())
            .with(Arc::new(FinishTool::new(finish.clone())));

        let objective = task.resolved_objective();
        let user_prompt = format!(
            "Objective: {}\nWorkspace root: {}\nWorking directory: {}\nOriginal request: {}",
            objective,
            root.display(),
            default_cwd.display(),
            run.input
        );

        let outcome = run_tool_loop(
            ctx,
            &registry,
            Some(&finish),
            ToolLoopSpec {
                task_id: &task.id,
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_prompt,
                options: self.config.loop_options(),
            },
        )
        .await?;

        let steps = run_command.steps_taken();
        info!(task_id = %task.id, steps, "Command task loop finished");
        Ok(finish_loop_update(
            outcome,
            json!({ "steps": steps, "cwd": default_cwd.display().to_string() }),
        ))
    }
}
