//! The explicit `finish` tool shared by the tool-loop capabilities.

use crate::error::ToolError;
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use capflow_core::{ResultCode, RunContext};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct FinishRecord {
    pub success: bool,
    pub summary: String,
    pub result_code: ResultCode,
}

/// Where a capability's completion is recorded. Set either by the model
/// calling `finish` or by a tool that ends the capability on its own
/// (an approval denial).
#[derive(Debug, Clone, Default)]
pub struct FinishSlot {
    inner: Arc<Mutex<Option<FinishRecord>>>,
}

impl FinishSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// First record wins.
    pub fn set(&self, record: FinishRecord) {
        if let Ok(mut slot) = self.inner.lock() {
            if slot.is_none() {
                *slot = Some(record);
            }
        }
    }

    pub fn get(&self) -> Option<FinishRecord> {
        self.inner.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn is_done(&self) -> bool {
        self.get().is_some()
    }
}

#[derive(Deserialize)]
struct FinishInput {
    success: bool,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    result_code: Option<String>,
}

pub struct FinishTool {
    slot: FinishSlot,
}

impl FinishTool {
    pub fn new(slot: FinishSlot) -> Self {
        Self { slot }
    }
}

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &'static str {
        "finish"
    }

    fn description(&self) -> &'static str {
        "Finish the task. Must be called explicitly once the objective is done or cannot be done."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "success": {"type": "boolean"},
                "summary": {"type": "string", "description": "What was done, for the user"},
                "result_code": {
                    "type": "string",
                    "enum": ["ok", "failed", "invalid_input"]
                }
            },
            "required": ["success", "summary"]
        })
    }

    async fn execute(&self, ctx: &RunContext, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        ctx.ensure_active()?;
        let input: FinishInput = serde_json::from_value(args)?;

        let result_code = match input.result_code.as_deref() {
            Some(raw) => raw.parse::<ResultCode>().map_err(ToolError::Validation)?,
            None if input.success => ResultCode::Ok,
            None => ResultCode::Failed,
        };
        if input.success && result_code != ResultCode::Ok {
            return Err(ToolError::Validation(format!(
                "success=true is inconsistent with result_code {}",
                result_code
            )));
        }

        self.slot.set(FinishRecord {
            success: input.success,
            summary: input.summary.trim().to_string(),
            result_code,
        });
        Ok(ToolResult::ok(json!({ "finished": true })))
    }
}
