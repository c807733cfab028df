pub mod bounded_loop;
pub mod collab;
pub mod context;
pub mod error;
pub mod event;
pub mod planning;
pub mod types;

pub use bounded_loop::{
    run_bounded_loop, BoundedLoopOptions, BoundedLoopOutcome, LoopStopReason, RoundOutcome,
};
pub use collab::{
    ApprovalDecision, ApprovalGate, ApprovalRequest, ChatMessage, ChatRole, ChunkHit,
    DocumentCodec, Embedder, HistoryStore, InMemoryHistory, KnowledgeIndex, ModelClient,
    ModelConfig, ModelTurn, SearchMode, SearchRequest, ToolCall,
};
pub use context::{CancelHandle, Collaborators, RunContext};
pub use error::{EngineError, ModelError};
pub use event::{
    ArtifactOperation, ChannelEventSink, CollectingEventSink, EventEnvelope, EventSink, RiskLevel,
    RunEvent,
};
pub use planning::PlanError;
pub use types::*;
