//! Model-driven tool loop shared by the capability executors.
//!
//! Each round asks the model for a turn, runs every requested tool call in
//! order and feeds the results back. The loop ends when the model answers
//! without tool calls, when the finish slot is filled, or when the bounded
//! loop runs out of steps or time.

use capflow_core::{
    run_bounded_loop, BoundedLoopOptions, BoundedLoopOutcome, ChatMessage, EngineError,
    RoundOutcome, RunContext, RunEvent,
};
use capflow_tools::{FinishRecord, FinishSlot, ToolRegistry, ToolResult};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct ToolLoopSpec<'a> {
    pub task_id: &'a str,
    pub system_prompt: String,
    pub user_prompt: String,
    pub options: BoundedLoopOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolLoopEnd {
    /// A tool filled the finish slot.
    Finished(FinishRecord),
    /// The model replied with text and no tool calls.
    Text(String),
}

pub async fn run_tool_loop(
    ctx: &RunContext,
    registry: &ToolRegistry,
    finish: Option<&FinishSlot>,
    spec: ToolLoopSpec<'_>,
) -> Result<BoundedLoopOutcome<ToolLoopEnd>, EngineError> {
    let schemas = registry.schemas();
    let transcript = Mutex::new(vec![
        ChatMessage::system(spec.system_prompt),
        ChatMessage::user(spec.user_prompt),
    ]);
    let task_id = spec.task_id;
    let schemas = &schemas;
    let transcript = &transcript;

    info!(task_id, tools = ?registry.list(), "Starting tool loop");

    let outcome = run_bounded_loop(spec.options, move |round| async move {
        ctx.ensure_active()?;
        debug!(task_id, round = round + 1, "Tool loop round");

        let mut messages = transcript.lock().await;
        let turn = ctx.complete_with_tools(&messages, schemas).await?;

        if turn.tool_calls.is_empty() {
            let text = turn.content.unwrap_or_default();
            messages.push(ChatMessage::assistant(text.clone()));
            return Ok(RoundOutcome::Done(ToolLoopEnd::Text(text)));
        }

        messages.push(ChatMessage::assistant_tool_calls(
            turn.content.clone(),
            turn.tool_calls.clone(),
        ));

        for call in turn.tool_calls {
            ctx.ensure_active()?;
            ctx.emit(RunEvent::ToolCallStarted {
                task_id: task_id.to_string(),
                call_id: call.id.clone(),
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
            });

            let result = match registry.execute(ctx, &call.name, call.arguments).await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() || ctx.is_cancelled() => {
                    return Err(EngineError::Cancelled);
                }
                Err(e) => {
                    warn!(task_id, tool = %call.name, error = %e, "Tool call failed");
                    ToolResult::from_error(&e)
                }
            };

            ctx.emit(RunEvent::ToolCallResult {
                task_id: task_id.to_string(),
                call_id: call.id.clone(),
                tool: call.name.clone(),
                ok: result.success,
                output: result.output.clone(),
                error: result.error.clone(),
            });
            messages.push(ChatMessage::tool_result(
                call.id,
                result.to_model_payload().to_string(),
            ));

            if let Some(record) = finish.and_then(FinishSlot::get) {
                // Remaining calls in this turn are dropped once the task is finished.
                return Ok(RoundOutcome::Done(ToolLoopEnd::Finished(record)));
            }
        }

        Ok(RoundOutcome::Continue)
    })
    .await?;

    info!(task_id, rounds = outcome.rounds(), ok = outcome.is_ok(), "Tool loop ended");
    Ok(outcome)
}
