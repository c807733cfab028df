use thiserror::Error;

/// Errors surfaced by external collaborators that speak the model protocol.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model call cancelled")]
    Cancelled,
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Engine-level error. `Cancelled` is a distinguished kind that unwinds to
/// the run service and is never reported as a failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Run cancelled")]
    Cancelled,
    #[error("Model error: {0}")]
    Model(String),
    #[error("Knowledge index error: {0}")]
    Knowledge(String),
    #[error("Document error: {0}")]
    Document(String),
    #[error("History error: {0}")]
    History(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }

    /// Structured check plus the message-text fallback. Only the outermost
    /// boundary should use this; everything inside matches on the kind.
    pub fn is_cancellation_like(&self) -> bool {
        self.is_cancelled() || self.to_string().to_lowercase().contains("cancel")
    }
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Cancelled => EngineError::Cancelled,
            other => EngineError::Model(other.to_string()),
        }
    }
}
