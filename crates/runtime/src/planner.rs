//! Turns the user's request into an ordered task plan.
//!
//! The model is asked for a structured plan first. If its output is missing
//! or unusable the plan degrades to one keyword-inferred task.

use crate::config::PlannerConfig;
use capflow_core::{CapabilityInput, CapabilityKind, EngineError, Run, RunContext, Task};
use serde_json::Value;
use tracing::{info, warn};

const PLANNER_PROMPT: &str = "You plan work for an assistant that has exactly three capabilities:\n\
- retrieval: answer from the user's knowledge base (input: query, document_ids, source_type)\n\
- command_execution: run shell commands inside the selected workspace folder (input: objective, preferred_cwd)\n\
- document_editing: edit a document inside the workspace (input: objective, source_path, output_path)\n\
Split the request into the fewest tasks that accomplish it, in execution order.\n\
Respond with a JSON object only: {\"tasks\": [{\"title\": string, \"kind\": string, \"objective\": string, \"input\": object?}]}";

const TITLE_CHARS: usize = 60;

pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Build the plan for `run`. Only cancellation is returned as an error.
    pub async fn plan(&self, ctx: &RunContext, run: &Run) -> Result<Vec<Task>, EngineError> {
        ctx.ensure_active()?;
        let mut user = format!("Request: {}", run.input);
        if !run.selected_document_ids.is_empty() {
            user.push_str(&format!(
                "\nSelected documents: {}",
                run.selected_document_ids.join(", ")
            ));
        }
        user.push_str(&format!(
            "\nWorkspace folder bound: {}",
            if run.workspace.is_some() { "yes" } else { "no" }
        ));

        let tasks = match ctx
            .complete_structured(PLANNER_PROMPT, &user, Some(self.config.temperature))
            .await
        {
            Ok(value) => parse_plan(&value, self.config.max_tasks),
            Err(e) if e.is_cancelled() || ctx.is_cancelled() => return Err(EngineError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Planner call failed");
                Vec::new()
            }
        };

        if tasks.is_empty() {
            let task = heuristic_task(&run.input);
            warn!(kind = %task.kind, "Planner output unusable, falling back to a single task");
            return Ok(vec![task]);
        }
        info!(tasks = tasks.len(), "Plan created");
        Ok(tasks)
    }
}

/// Parse `{"tasks": [...]}`. Entries without a kind or objective are dropped;
/// unknown kinds are kept so dispatch can reject them.
pub fn parse_plan(value: &Value, max_tasks: usize) -> Vec<Task> {
    let Some(entries) = value.get("tasks").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(parse_task)
        .take(max_tasks)
        .collect()
}

fn parse_task(entry: &Value) -> Option<Task> {
    let kind = non_empty(entry.get("kind"))?;
    let objective = non_empty(entry.get("objective")).or_else(|| non_empty(entry.get("title")))?;
    let title = non_empty(entry.get("title")).unwrap_or_else(|| short_title(&objective));

    let mut task = Task::new(title, kind.clone(), objective);
    if let Some(Value::Object(map)) = entry.get("input") {
        let mut map = map.clone();
        map.entry("kind").or_insert_with(|| Value::String(kind.clone()));
        match serde_json::from_value::<CapabilityInput>(Value::Object(map)) {
            Ok(input) => task = task.with_input(input),
            Err(e) => warn!(kind = %kind, error = %e, "Dropping malformed task input"),
        }
    }
    Some(task)
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn short_title(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= TITLE_CHARS {
        return text.to_string();
    }
    let mut title: String = text.chars().take(TITLE_CHARS).collect();
    title.push('…');
    title
}

/// Best-effort keyword guess. Only used when structured planning fails.
pub fn infer_capability(input: &str) -> CapabilityKind {
    let lower = input.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '_' || c == '-'))
        .filter(|w| !w.is_empty())
        .collect();

    let document_tokens = ["docx", "document", "documents", "paragraph", "memo", "letter"];
    if words
        .iter()
        .any(|w| document_tokens.contains(w) || w.ends_with(".docx"))
    {
        return CapabilityKind::DocumentEditing;
    }

    let command_tokens = [
        "run", "execute", "command", "shell", "terminal", "script", "ls", "mkdir", "touch",
        "install", "build", "compile", "test", "git", "npm", "cargo", "python", "create",
        "delete", "remove", "move", "copy", "rename", "folder", "directory",
    ];
    if words.iter().any(|w| command_tokens.contains(w)) {
        return CapabilityKind::CommandExecution;
    }

    CapabilityKind::Retrieval
}

pub fn heuristic_task(input: &str) -> Task {
    let kind = infer_capability(input);
    Task::new(short_title(input), kind.as_str(), input.trim())
}
