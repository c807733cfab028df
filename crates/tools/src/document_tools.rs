//! Document editing tools: inspect, apply edits, save.
//!
//! All three share one `DocumentSession` holding the working text for the
//! current capability invocation.

use crate::edits::apply_edits;
use crate::error::ToolError;
use crate::finish::{FinishRecord, FinishSlot};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use capflow_core::{ApprovalRequest, ArtifactOperation, ResultCode, RiskLevel, RunContext, RunEvent};
use capflow_policy::resolve_within_workspace;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct DocumentToolConfig {
    pub task_id: String,
    /// Canonical workspace root.
    pub workspace_root: PathBuf,
    /// Source document suggested by the task input.
    pub source_path: Option<String>,
    /// Output path suggested by the task input.
    pub output_path: Option<String>,
    pub preview_chars: usize,
}

#[derive(Debug, Default)]
struct DocumentState {
    source: Option<PathBuf>,
    text: Option<String>,
    saved: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentSession {
    state: Arc<Mutex<DocumentState>>,
}

impl DocumentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved_outputs(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .map(|s| s.saved.clone())
            .unwrap_or_default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut DocumentState) -> T) -> Result<T, ToolError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ToolError::Execution("document session lock poisoned".into()))?;
        Ok(f(&mut state))
    }
}

/// The three document tools wired to one session.
pub fn document_tools(
    config: DocumentToolConfig,
    session: DocumentSession,
    finish: FinishSlot,
) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(InspectDocumentTool {
            config: config.clone(),
            session: session.clone(),
        }),
        Arc::new(ApplyEditsTool {
            session: session.clone(),
        }),
        Arc::new(SaveDocumentTool {
            config,
            session,
            finish,
        }),
    ]
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

/// `<stem>-edited.<ext>` next to the source.
pub fn default_output_path(source: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    source.with_file_name(format!("{}-edited.{}", stem, extension))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

pub struct InspectDocumentTool {
    config: DocumentToolConfig,
    session: DocumentSession,
}

#[derive(Deserialize)]
struct InspectInput {
    #[serde(default)]
    path: Option<String>,
}

#[async_trait]
impl Tool for InspectDocumentTool {
    fn name(&self) -> &'static str {
        "docx_inspect"
    }

    fn description(&self) -> &'static str {
        "Load a document from the workspace and return its paragraph count, character count and a preview"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Document path relative to the workspace"}
            }
        })
    }

    async fn execute(&self, ctx: &RunContext, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        ctx.ensure_active()?;
        let input: InspectInput = serde_json::from_value(args)?;
        let raw = input
            .path
            .or_else(|| self.config.source_path.clone())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ToolError::Validation("Missing 'path' field".into()))?;

        let root = &self.config.workspace_root;
        let path = resolve_within_workspace(root, root, &raw)?;
        let extension = ctx.documents().extension().to_string();
        if !has_extension(&path, &extension) {
            return Err(ToolError::Validation(format!(
                "Expected a .{} document: {}",
                extension, raw
            )));
        }
        if !path.is_file() {
            return Err(ToolError::Validation(format!("Document not found: {}", raw)));
        }

        let codec = ctx.documents().clone();
        let text = ctx.guard(codec.read_text(&path)).await?;
        let paragraph_count = text.lines().filter(|l| !l.trim().is_empty()).count();
        let char_count = text.chars().count();
        let body = json!({
            "path": path.display().to_string(),
            "paragraphCount": paragraph_count,
            "charCount": char_count,
            "preview": preview(&text, self.config.preview_chars),
        });

        self.session.with(|state| {
            state.source = Some(path);
            state.text = Some(text);
        })?;
        Ok(ToolResult::ok(body))
    }
}

pub struct ApplyEditsTool {
    session: DocumentSession,
}

#[derive(Deserialize)]
struct ApplyEditsInput {
    edits: Vec<serde_json::Value>,
}

#[async_trait]
impl Tool for ApplyEditsTool {
    fn name(&self) -> &'static str {
        "docx_apply_edits"
    }

    fn description(&self) -> &'static str {
        "Apply edits to the inspected document text: replace_text {find, replace, all?} and append_paragraph {text}"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "op": {"type": "string", "enum": ["replace_text", "append_paragraph"]},
                            "find": {"type": "string"},
                            "replace": {"type": "string"},
                            "all": {"type": "boolean"},
                            "text": {"type": "string"}
                        },
                        "required": ["op"]
                    }
                }
            },
            "required": ["edits"]
        })
    }

    async fn execute(&self, ctx: &RunContext, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        ctx.ensure_active()?;
        let input: ApplyEditsInput = serde_json::from_value(args)?;
        if input.edits.is_empty() {
            return Err(ToolError::Validation("No edits given".into()));
        }

        let report = self.session.with(|state| {
            state
                .text
                .as_mut()
                .map(|text| (apply_edits(text, &input.edits), text.chars().count()))
        })?;
        let (report, char_count) = report
            .ok_or_else(|| ToolError::Validation("Call docx_inspect before applying edits".into()))?;

        let mut body = serde_json::to_value(&report)?;
        body["charCount"] = json!(char_count);
        if report.applied_count == 0 {
            return Ok(ToolResult::failure(
                ResultCode::InvalidInput,
                "No edit could be applied",
                body,
            ));
        }
        Ok(ToolResult::ok(body))
    }
}

pub struct SaveDocumentTool {
    config: DocumentToolConfig,
    session: DocumentSession,
    finish: FinishSlot,
}

#[derive(Deserialize)]
struct SaveInput {
    #[serde(default)]
    output_path: Option<String>,
    #[serde(default)]
    overwrite: bool,
}

#[async_trait]
impl Tool for SaveDocumentTool {
    fn name(&self) -> &'static str {
        "docx_save_output"
    }

    fn description(&self) -> &'static str {
        "Save the edited text to an output document inside the workspace. Overwriting an existing file needs overwrite=true and user approval."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "output_path": {"type": "string", "description": "Output path relative to the workspace"},
                "overwrite": {"type": "boolean", "default": false}
            }
        })
    }

    async fn execute(&self, ctx: &RunContext, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        ctx.ensure_active()?;
        let input: SaveInput = serde_json::from_value(args)?;
        let (source, text) = self.session.with(|state| (state.source.clone(), state.text.clone()))?;
        let (Some(source), Some(text)) = (source, text) else {
            return Err(ToolError::Validation("Call docx_inspect before saving".into()));
        };

        let extension = ctx.documents().extension().to_string();
        let root = &self.config.workspace_root;
        let target = match input
            .output_path
            .or_else(|| self.config.output_path.clone())
            .filter(|p| !p.trim().is_empty())
        {
            Some(raw) => resolve_within_workspace(root, root, &raw)?,
            None => default_output_path(&source, &extension),
        };
        if !has_extension(&target, &extension) {
            return Err(ToolError::Validation(format!(
                "Output must be a .{} file: {}",
                extension,
                target.display()
            )));
        }

        let existed = target.exists();
        let display = target.display().to_string();
        if existed {
            if !input.overwrite {
                return Ok(ToolResult::failure(
                    ResultCode::ApprovalDenied,
                    format!("{} already exists; pass overwrite=true to replace it", display),
                    json!({ "path": display }),
                ));
            }
            let decision = ctx
                .request_approval(
                    &self.config.task_id,
                    ApprovalRequest {
                        command: format!("overwrite {}", display),
                        risk_level: RiskLevel::Medium,
                        reason: "Existing document will be replaced".to_string(),
                    },
                )
                .await?;
            if !decision.approved {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "Overwrite was not approved".to_string());
                tracing::warn!(path = %target.display(), %reason, "Overwrite denied");
                self.finish.set(FinishRecord {
                    success: false,
                    summary: format!("Overwrite of {} not approved: {}", display, reason),
                    result_code: ResultCode::ApprovalDenied,
                });
                return Ok(ToolResult::failure(
                    ResultCode::ApprovalDenied,
                    reason,
                    json!({ "path": display }),
                ));
            }
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::Execution(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        let codec = ctx.documents().clone();
        ctx.guard(codec.write_text(&target, &text)).await?;

        let operation = if existed {
            ArtifactOperation::Updated
        } else {
            ArtifactOperation::Created
        };
        ctx.emit(RunEvent::FileArtifact {
            task_id: self.config.task_id.clone(),
            path: display.clone(),
            operation,
        });
        tracing::info!(path = %target.display(), ?operation, "Document saved");
        self.session.with(|state| state.saved.push(target))?;

        Ok(ToolResult::ok(json!({
            "path": display,
            "operation": operation,
            "charCount": text.chars().count(),
        })))
    }
}
