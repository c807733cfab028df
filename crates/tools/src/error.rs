use capflow_core::{EngineError, ResultCode};
use capflow_policy::SandboxError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Sandbox violation: {0}")]
    Sandbox(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ToolError {
    pub fn code(&self) -> ResultCode {
        match self {
            ToolError::Validation(_) | ToolError::NotFound(_) => ResultCode::InvalidInput,
            _ => ResultCode::Failed,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolError::Engine(e) if e.is_cancelled())
    }
}

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        ToolError::Sandbox(err.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::Validation(err.to_string())
    }
}
