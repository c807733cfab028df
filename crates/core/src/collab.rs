//! Narrow interfaces to the external collaborators the engine drives.

use crate::error::{EngineError, ModelError};
use crate::event::RiskLevel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool calls requested by an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.unwrap_or_default(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One assistant turn in a tool-augmented exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Active model configuration, exposed read-only to executors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai_compatible".to_string(),
            model: "llama3.1".to_string(),
            temperature: 0.2,
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Plain completion over a message list.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError>;

    /// Completion constrained to a JSON object.
    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> Result<serde_json::Value, ModelError>;

    /// Completion that may request tool calls. `tools` are OpenAI-style
    /// function schemas.
    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<ModelTurn, ModelError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Hybrid,
    Vector,
    FullText,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    pub mode: SearchMode,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkHit {
    pub document_id: String,
    pub document_name: String,
    pub excerpt: String,
    pub score: f32,
}

#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    async fn search(&self, request: SearchRequest) -> Result<Vec<ChunkHit>, EngineError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

/// Reads and writes the editable document format.
#[async_trait]
pub trait DocumentCodec: Send + Sync {
    /// Expected file extension, without the dot.
    fn extension(&self) -> &str;

    /// Flattened text, one paragraph per line.
    async fn read_text(&self, path: &Path) -> Result<String, EngineError>;

    async fn write_text(&self, path: &Path, text: &str) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub command: String,
    pub risk_level: RiskLevel,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalDecision;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Prior conversation for a session, oldest first.
    async fn load(&self, session_id: &str) -> Result<Vec<ChatMessage>, EngineError>;
}

/// Session history held in memory.
#[derive(Default)]
pub struct InMemoryHistory {
    sessions: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, session_id: &str, message: ChatMessage) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions
                .entry(session_id.to_string())
                .or_default()
                .push(message);
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn load(&self, session_id: &str) -> Result<Vec<ChatMessage>, EngineError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| EngineError::History("history lock poisoned".to_string()))?;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }
}
