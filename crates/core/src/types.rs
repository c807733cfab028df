use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Outcome classification of a task. Consumers branch on these, so they are
/// never collapsed into `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Ok,
    Failed,
    WorkspaceRequired,
    ApprovalDenied,
    BoundedLoopError,
    InvalidInput,
}

impl ResultCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Ok => "ok",
            ResultCode::Failed => "failed",
            ResultCode::WorkspaceRequired => "workspace_required",
            ResultCode::ApprovalDenied => "approval_denied",
            ResultCode::BoundedLoopError => "bounded_loop_error",
            ResultCode::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ok" => Ok(ResultCode::Ok),
            "failed" => Ok(ResultCode::Failed),
            "workspace_required" => Ok(ResultCode::WorkspaceRequired),
            "approval_denied" => Ok(ResultCode::ApprovalDenied),
            "bounded_loop_error" => Ok(ResultCode::BoundedLoopError),
            "invalid_input" => Ok(ResultCode::InvalidInput),
            other => Err(format!("unknown result code: {}", other)),
        }
    }
}

/// The closed set of capabilities the engine can execute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Retrieval,
    CommandExecution,
    DocumentEditing,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [
        CapabilityKind::Retrieval,
        CapabilityKind::CommandExecution,
        CapabilityKind::DocumentEditing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::Retrieval => "retrieval",
            CapabilityKind::CommandExecution => "command_execution",
            CapabilityKind::DocumentEditing => "document_editing",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "retrieval" => Ok(CapabilityKind::Retrieval),
            "command_execution" => Ok(CapabilityKind::CommandExecution),
            "document_editing" => Ok(CapabilityKind::DocumentEditing),
            other => Err(format!("Unsupported capability kind: {}", other)),
        }
    }
}

/// Capability-specific structured input, validated at dispatch time against
/// the task's declared kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityInput {
    Retrieval {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        document_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_type: Option<String>,
    },
    CommandExecution {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        objective: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preferred_cwd: Option<String>,
    },
    DocumentEditing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        objective: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_path: Option<String>,
    },
}

impl CapabilityInput {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            CapabilityInput::Retrieval { .. } => CapabilityKind::Retrieval,
            CapabilityInput::CommandExecution { .. } => CapabilityKind::CommandExecution,
            CapabilityInput::DocumentEditing { .. } => CapabilityKind::DocumentEditing,
        }
    }

    /// Objective override carried by the structured input, if any.
    pub fn objective(&self) -> Option<&str> {
        let text = match self {
            CapabilityInput::Retrieval { query, .. } => query.as_deref(),
            CapabilityInput::CommandExecution { objective, .. } => objective.as_deref(),
            CapabilityInput::DocumentEditing { objective, .. } => objective.as_deref(),
        };
        text.map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    /// Declared capability kind, exactly as planned. Resolved against the
    /// registry at dispatch so unknown kinds fail loudly.
    pub kind: String,
    pub objective: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<CapabilityInput>,
    pub status: TaskStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_code: Option<ResultCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<serde_json::Value>,
}

impl Task {
    pub fn new(title: impl Into<String>, kind: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            id: format!("task-{}", uuid::Uuid::new_v4().simple()),
            title: title.into(),
            kind: kind.into(),
            objective: objective.into(),
            input: None,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            result_code: None,
            result_message: None,
            result_data: None,
        }
    }

    pub fn with_input(mut self, input: CapabilityInput) -> Self {
        self.input = Some(input);
        self
    }

    /// Objective text the executor should work on.
    pub fn resolved_objective(&self) -> &str {
        self.input
            .as_ref()
            .and_then(CapabilityInput::objective)
            .unwrap_or(self.objective.as_str())
    }
}

/// Sandbox root bound to a run. Always canonical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceBinding {
    pub root: PathBuf,
}

impl WorkspaceBinding {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub run_id: String,
    pub session_id: String,
    pub status: RunStatus,
    pub input: String,
    pub plan: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_document_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceBinding>,
}

impl Run {
    pub fn new(run_id: impl Into<String>, session_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            status: RunStatus::Running,
            input: input.into(),
            plan: Vec::new(),
            active_task_id: None,
            error: None,
            output: None,
            selected_document_ids: Vec::new(),
            workspace: None,
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.plan.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.plan.iter_mut().find(|t| t.id == task_id)
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.active_task_id.as_deref().and_then(|id| self.task(id))
    }

    /// Append a capability's contribution to the running output text.
    pub fn append_output(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match &mut self.output {
            Some(existing) if !existing.is_empty() => {
                existing.push_str("\n\n");
                existing.push_str(text);
            }
            _ => self.output = Some(text.to_string()),
        }
    }
}
