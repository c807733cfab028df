//! `run_command`: one sandboxed shell command per call.

use crate::error::ToolError;
use crate::finish::{FinishRecord, FinishSlot};
use crate::process::{run_shell, ProcessSpec};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use capflow_core::{ApprovalRequest, EngineError, ResultCode, RunContext, RunEvent};
use capflow_policy::{
    assess_command_risk, check_command_boundary, detect_artifact_candidates,
    final_artifact_operation, resolve_within_workspace,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CommandToolConfig {
    pub task_id: String,
    /// Canonical workspace root.
    pub workspace_root: PathBuf,
    /// Directory commands run in when the model passes no `cwd`.
    pub default_cwd: PathBuf,
    pub command_timeout_ms: u64,
    pub max_output_bytes: usize,
}

#[derive(Deserialize)]
struct RunCommandInput {
    command: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub struct RunCommandTool {
    config: CommandToolConfig,
    steps: Arc<AtomicU32>,
    finish: FinishSlot,
}

impl RunCommandTool {
    pub fn new(config: CommandToolConfig, finish: FinishSlot) -> Self {
        Self {
            config,
            steps: Arc::new(AtomicU32::new(0)),
            finish,
        }
    }

    pub fn steps_taken(&self) -> u32 {
        self.steps.load(Ordering::SeqCst)
    }

    fn step_error(&self, ctx: &RunContext, step: u32, command: &str, code: ResultCode, error: &str) {
        ctx.emit(RunEvent::CommandStepError {
            task_id: self.config.task_id.clone(),
            step,
            command: command.to_string(),
            code,
            error: error.to_string(),
        });
    }

    fn resolve_cwd(&self, raw: Option<&str>) -> Result<PathBuf, ToolError> {
        let cwd = match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => resolve_within_workspace(
                &self.config.workspace_root,
                &self.config.default_cwd,
                raw,
            )?,
            None => resolve_within_workspace(&self.config.workspace_root, &self.config.default_cwd, ".")?,
        };
        if !cwd.is_dir() {
            return Err(ToolError::Validation(format!(
                "Working directory does not exist: {}",
                cwd.display()
            )));
        }
        Ok(cwd)
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Run one shell command inside the workspace. Paths must stay inside the workspace; risky commands need user approval."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command line"},
                "cwd": {"type": "string", "description": "Working directory relative to the workspace"},
                "timeout_ms": {"type": "integer", "description": "Per-command timeout in milliseconds, capped at the configured limit"}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, ctx: &RunContext, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        ctx.ensure_active()?;
        let input: RunCommandInput = serde_json::from_value(args)?;
        let command = input.command.trim().to_string();
        if command.is_empty() {
            return Err(ToolError::Validation("Empty command".into()));
        }

        let step = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        let task_id = self.config.task_id.as_str();

        let cwd = match self.resolve_cwd(input.cwd.as_deref()) {
            Ok(cwd) => cwd,
            Err(e) => {
                self.step_error(ctx, step, &command, e.code(), &e.to_string());
                return Err(e);
            }
        };

        let boundary = check_command_boundary(&command, &self.config.workspace_root);
        if !boundary.ok {
            let reason = boundary
                .reason
                .unwrap_or_else(|| "Command escapes the workspace".to_string());
            tracing::warn!(%command, %reason, "Command rejected by boundary check");
            self.step_error(ctx, step, &command, ResultCode::Failed, &reason);
            return Err(ToolError::Sandbox(reason));
        }

        let risk = assess_command_risk(&command);
        if risk.level.requires_approval() {
            let decision = ctx
                .request_approval(
                    task_id,
                    ApprovalRequest {
                        command: command.clone(),
                        risk_level: risk.level,
                        reason: risk.reason.clone(),
                    },
                )
                .await?;
            if !decision.approved {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "Command was not approved".to_string());
                tracing::warn!(%command, %reason, "Command denied");
                self.step_error(ctx, step, &command, ResultCode::ApprovalDenied, &reason);
                self.finish.set(FinishRecord {
                    success: false,
                    summary: format!("Command not approved: {} ({})", command, reason),
                    result_code: ResultCode::ApprovalDenied,
                });
                return Ok(ToolResult::failure(
                    ResultCode::ApprovalDenied,
                    reason,
                    json!({ "step": step, "command": command }),
                ));
            }
        }

        // Remember what existed so artifacts can be told apart afterwards.
        let candidates: Vec<_> = detect_artifact_candidates(&command)
            .into_iter()
            .filter_map(|candidate| {
                resolve_within_workspace(&self.config.workspace_root, &cwd, &candidate.raw_path)
                    .ok()
                    .map(|path| {
                        let existed = path.exists();
                        (candidate, path, existed)
                    })
            })
            .collect();

        ctx.emit(RunEvent::CommandStepStarted {
            task_id: task_id.to_string(),
            step,
            command: command.clone(),
            cwd: cwd.display().to_string(),
            risk: risk.level,
        });
        tracing::info!(%command, cwd = %cwd.display(), step, "Running command");

        let spec = ProcessSpec {
            command: command.clone(),
            cwd: cwd.clone(),
            timeout_ms: input
                .timeout_ms
                .map_or(self.config.command_timeout_ms, |t| t.min(self.config.command_timeout_ms)),
            max_output_bytes: self.config.max_output_bytes,
        };
        let output = tokio::select! {
            biased;
            _ = ctx.cancellation_token().cancelled() => {
                return Err(ToolError::Engine(EngineError::Cancelled));
            }
            result = run_shell(&spec) => match result {
                Ok(output) => output,
                Err(e) => {
                    self.step_error(ctx, step, &command, e.code(), &e.to_string());
                    return Err(e);
                }
            },
        };

        ctx.emit(RunEvent::CommandStepResult {
            task_id: task_id.to_string(),
            step,
            exit_code: output.exit_code,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            timed_out: output.timed_out,
            truncated: output.truncated,
            duration_ms: output.duration_ms,
        });

        let mut artifacts = Vec::new();
        for (candidate, path, existed) in &candidates {
            if !path.exists() {
                continue;
            }
            if let Some(operation) = final_artifact_operation(candidate, *existed) {
                ctx.emit(RunEvent::FileArtifact {
                    task_id: task_id.to_string(),
                    path: path.display().to_string(),
                    operation,
                });
                artifacts.push(json!({ "path": path.display().to_string(), "operation": operation }));
            }
        }

        let body = json!({
            "step": step,
            "exitCode": output.exit_code,
            "stdout": output.stdout,
            "stderr": output.stderr,
            "timedOut": output.timed_out,
            "truncated": output.truncated,
            "durationMs": output.duration_ms,
            "artifacts": artifacts,
        });
        if output.succeeded() {
            Ok(ToolResult::ok(body))
        } else if output.timed_out {
            Ok(ToolResult::failure(ResultCode::Failed, "Command timed out", body))
        } else {
            Ok(ToolResult::failure(
                ResultCode::Failed,
                format!("Command exited with status {:?}", output.exit_code),
                body,
            ))
        }
    }
}
