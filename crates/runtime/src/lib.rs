//! Capability run engine: planning, dispatch and the run lifecycle.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod graph;
pub mod planner;
pub mod react;
pub mod service;

pub use capabilities::{
    CapabilityExecutor, CapabilityRegistry, CommandExecutor, DocumentExecutor, RetrievalExecutor,
    TaskUpdate,
};
pub use config::{
    load_runtime_config, CommandConfig, DocumentConfig, GraphConfig, HistoryConfig, ModelSettings,
    PlannerConfig, RetrievalConfig, RuntimeConfig,
};
pub use error::{ConfigError, ServiceError};
pub use graph::RunGraph;
pub use planner::{heuristic_task, infer_capability, parse_plan, Planner};
pub use react::{run_tool_loop, ToolLoopEnd, ToolLoopSpec};
pub use service::{
    CancelResponse, RunOutcome, RunService, StartRunRequest, StartRunResponse, CANCELLED_MESSAGE,
};
