use crate::error::ToolError;
use async_trait::async_trait;
use capflow_core::{ResultCode, RunContext};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ResultCode>,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            code: None,
        }
    }

    pub fn failure(code: ResultCode, error: impl Into<String>, output: Value) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
            code: Some(code),
        }
    }

    /// Structured failure for an error caught at the tool boundary.
    pub fn from_error(err: &ToolError) -> Self {
        Self::failure(err.code(), err.to_string(), Value::Null)
    }

    /// Payload handed back to the model as the tool message.
    pub fn to_model_payload(&self) -> Value {
        let mut payload = json!({ "ok": self.success });
        if !self.output.is_null() {
            payload["result"] = self.output.clone();
        }
        if let Some(error) = &self.error {
            payload["error"] = json!(error);
        }
        if let Some(code) = self.code {
            payload["code"] = json!(code);
        }
        payload
    }
}

/// A model-callable tool. Tools are built per capability invocation and
/// may hold that invocation's state.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> Value;

    async fn execute(&self, ctx: &RunContext, args: Value) -> Result<ToolResult, ToolError>;
}
