//! Retrieval capability: a few rounds of knowledge-index search followed by
//! a strict `{satisfied, note}` judgement.

use super::{CapabilityExecutor, TaskUpdate};
use crate::config::RetrievalConfig;
use crate::react::{run_tool_loop, ToolLoopEnd, ToolLoopSpec};
use async_trait::async_trait;
use capflow_core::{
    BoundedLoopOutcome, CapabilityInput, CapabilityKind, ChunkHit, EngineError, ResultCode, Run,
    RunContext, Task,
};
use capflow_tools::{search_tools, EvidenceLog, SearchScope, ToolRegistry};
use serde_json::{json, Value};
use tracing::{debug, info};

const SEARCH_PROMPT: &str = "You answer questions from a private knowledge base. \
Use the search tools to find relevant passages; refine the query if results are weak. \
When you have enough, reply in plain text with the findings and cite document names. \
If nothing relevant exists, say so plainly.";

const JUDGE_PROMPT: &str = "You judge whether retrieved findings answer an objective. \
Respond with a JSON object only: {\"satisfied\": boolean, \"note\": string}. \
The note explains what is missing when not satisfied.";

const EVIDENCE_IN_JUDGEMENT: usize = 8;

/// Parsed judgement. Anything malformed counts as not satisfied.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub satisfied: bool,
    pub note: String,
}

impl Judgement {
    pub fn from_value(value: &Value) -> Self {
        Self {
            satisfied: value.get("satisfied").and_then(Value::as_bool).unwrap_or(false),
            note: value
                .get("note")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        }
    }
}

pub struct RetrievalExecutor {
    config: RetrievalConfig,
}

impl RetrievalExecutor {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    fn scope(&self, run: &Run, task: &Task) -> SearchScope {
        let (document_ids, source_type) = match &task.input {
            Some(CapabilityInput::Retrieval {
                document_ids,
                source_type,
                ..
            }) => (document_ids.clone(), source_type.clone()),
            _ => (Vec::new(), None),
        };
        SearchScope {
            document_ids: if document_ids.is_empty() {
                run.selected_document_ids.clone()
            } else {
                document_ids
            },
            source_type,
            top_k: self.config.top_k,
        }
    }
}

fn evidence_digest(hits: &[ChunkHit]) -> String {
    if hits.is_empty() {
        return "(no passages retrieved)".to_string();
    }
    hits.iter()
        .take(EVIDENCE_IN_JUDGEMENT)
        .enumerate()
        .map(|(i, hit)| format!("[{}] {}: {}", i + 1, hit.document_name, hit.excerpt))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sources(hits: &[ChunkHit]) -> Vec<Value> {
    let mut seen = Vec::new();
    for hit in hits {
        if !seen.iter().any(|(id, _): &(String, String)| id == &hit.document_id) {
            seen.push((hit.document_id.clone(), hit.document_name.clone()));
        }
    }
    seen.into_iter()
        .map(|(id, name)| json!({ "documentId": id, "documentName": name }))
        .collect()
}

#[async_trait]
impl CapabilityExecutor for RetrievalExecutor {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Retrieval
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        run: &Run,
        task: &Task,
    ) -> Result<TaskUpdate, EngineError> {
        ctx.ensure_active()?;
        let objective = task.resolved_objective();
        let evidence = EvidenceLog::new();

        let mut registry = ToolRegistry::new();
        for tool in search_tools(self.scope(run, task), evidence.clone()) {
            registry.register(tool);
        }

        let mut user_prompt = format!("Objective: {}\nOriginal request: {}", objective, run.input);
        if let Some(previous) = &task.last_error {
            user_prompt.push_str(&format!("\nA previous attempt fell short: {}", previous));
        }

        let outcome = run_tool_loop(
            ctx,
            &registry,
            None,
            ToolLoopSpec {
                task_id: &task.id,
                system_prompt: SEARCH_PROMPT.to_string(),
                user_prompt,
                options: self.config.loop_options(),
            },
        )
        .await?;

        let findings = match outcome {
            BoundedLoopOutcome::Completed {
                value: ToolLoopEnd::Text(text),
                ..
            } => text.trim().to_string(),
            BoundedLoopOutcome::Completed { .. } => String::new(),
            BoundedLoopOutcome::Exhausted { rounds, reason } => {
                debug!(task_id = %task.id, rounds, ?reason, "Search rounds exhausted before an answer");
                String::new()
            }
        };

        ctx.ensure_active()?;
        let hits = evidence.hits();
        let judge_input = format!(
            "Objective: {}\n\nFindings:\n{}\n\nRetrieved passages:\n{}",
            objective,
            if findings.is_empty() { "(none)" } else { findings.as_str() },
            evidence_digest(&hits)
        );
        let raw = ctx
            .complete_structured(JUDGE_PROMPT, &judge_input, Some(0.0))
            .await?;
        let judgement = Judgement::from_value(&raw);
        info!(
            task_id = %task.id,
            satisfied = judgement.satisfied,
            passages = hits.len(),
            attempt = task.attempts,
            "Retrieval judged"
        );

        let data = json!({
            "passages": hits.len(),
            "sources": sources(&hits),
        });

        if judgement.satisfied {
            let output = if findings.is_empty() {
                judgement.note.clone()
            } else {
                findings
            };
            return Ok(TaskUpdate::Completed {
                result_code: ResultCode::Ok,
                message: Some(judgement.note).filter(|n| !n.is_empty()),
                data: Some(data),
                output: Some(output).filter(|o| !o.is_empty()),
            });
        }

        let note = if judgement.note.is_empty() {
            "Retrieval was not satisfied".to_string()
        } else {
            judgement.note
        };
        if task.attempts < self.config.max_attempts {
            return Ok(TaskUpdate::Retry { error: note });
        }
        Ok(TaskUpdate::failed(ResultCode::Failed, note).with_data(data))
    }
}
