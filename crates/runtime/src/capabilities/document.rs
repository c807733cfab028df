//! Document-editing capability: inspect, edit, save and finish.

use super::{finish_loop_update, require_workspace, CapabilityExecutor, TaskUpdate};
use crate::config::DocumentConfig;
use crate::react::{run_tool_loop, ToolLoopSpec};
use async_trait::async_trait;
use capflow_core::{CapabilityInput, CapabilityKind, EngineError, Run, RunContext, Task};
use capflow_tools::{
    document_tools, DocumentSession, DocumentToolConfig, FinishSlot, FinishTool, ToolRegistry,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub struct DocumentExecutor {
    config: DocumentConfig,
}

impl DocumentExecutor {
    pub fn new(config: DocumentConfig) -> Self {
        Self { config }
    }

    fn system_prompt(&self) -> String {
        let ext = self.config.extension.trim_start_matches('.');
        format!(
            "You edit .{ext} documents inside a sandboxed workspace folder. \
Always call docx_inspect first, then docx_apply_edits with replace_text or append_paragraph edits, \
then docx_save_output. Output paths must stay inside the workspace and end in .{ext}. \
Overwriting an existing file requires overwrite=true and the user's approval. \
Call finish with a short summary when done or when the edit cannot be made. \
A plain text answer does not finish the task."
        )
    }
}

#[async_trait]
impl CapabilityExecutor for DocumentExecutor {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::DocumentEditing
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

        let (source_path, output_path) = match &task.input {
            Some(CapabilityInput::DocumentEditing {
                source_path,
                output_path,
                ..
            }) => (source_path.clone(), output_path.clone()),
            _ => (None, None),
        };

        let finish = FinishSlot::new();
        let session = DocumentSession::new();
        let mut registry = ToolRegistry::new().with(Arc::new(FinishTool::new(finish.clone())));
        for tool in document_tools(
            DocumentToolConfig {
                task_id: task.id.clone(),
                workspace_root: root.clone(),
                source_path: source_path.clone(),
                output_path: output_path.clone(),
                preview_chars: self.config.preview_chars,
            },
            session.clone(),
            finish.clone(),
        ) {
            registry.register(tool);
        }

        let mut user_prompt = format!(
            "Objective: {}\nWorkspace root: {}",
            task.resolved_objective(),
            root.display()
        );
        if let Some(source) = &source_path {
            user_prompt.push_str(&format!("\nSource document: {}", source));
        }
        if let Some(output) = &output_path {
            user_prompt.push_str(&format!("\nRequested output: {}", output));
        }
        user_prompt.push_str(&format!("\nOriginal request: {}", run.input));

        let outcome = run_tool_loop(
            ctx,
            &registry,
            Some(&finish),
            ToolLoopSpec {
                task_id: &task.id,
                system_prompt: self.system_prompt(),
                user_prompt,
                options: self.config.loop_options(),
            },
        )
        .await?;

        let saved: Vec<String> = session
            .saved_outputs()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        info!(task_id = %task.id, saved = saved.len(), "Document task loop finished");
        Ok(finish_loop_update(outcome, json!({ "savedOutputs": saved })))
    }
}
