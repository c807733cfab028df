//! Observable run events.
//!
//! Events are a one-way channel: they are never replayed into run state.
//! A consumer must be able to rebuild plan/task/tool/command/artifact state
//! by folding the stream in `seq` order.

use crate::types::{ResultCode, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn requires_approval(self) -> bool {
        self > RiskLevel::Low
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOperation {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        session_id: String,
        input: String,
    },
    PlanCreated {
        tasks: Vec<Task>,
    },
    TaskStarted {
        task_id: String,
        title: String,
        kind: String,
        attempt: u32,
    },
    TaskRetry {
        task_id: String,
        attempt: u32,
        reason: String,
    },
    TaskCompleted {
        task_id: String,
        result_code: ResultCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    TaskFailed {
        task_id: String,
        result_code: ResultCode,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    ToolCallStarted {
        task_id: String,
        call_id: String,
        tool: String,
        arguments: serde_json::Value,
    },
    ToolCallResult {
        task_id: String,
        call_id: String,
        tool: String,
        ok: bool,
        output: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    CommandStepStarted {
        task_id: String,
        step: u32,
        command: String,
        cwd: String,
        risk: RiskLevel,
    },
    CommandStepResult {
        task_id: String,
        step: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        timed_out: bool,
        truncated: bool,
        duration_ms: u64,
    },
    CommandStepError {
        task_id: String,
        step: u32,
        command: String,
        code: ResultCode,
        error: String,
    },
    WorkspaceRequired {
        task_id: String,
        capability: String,
        message: String,
    },
    ApprovalRequired {
        task_id: String,
        request_id: String,
        command: String,
        risk_level: RiskLevel,
        reason: String,
    },
    ApprovalDecided {
        task_id: String,
        request_id: String,
        approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    FileArtifact {
        task_id: String,
        path: String,
        operation: ArtifactOperation,
    },
    RunCompleted {
        output: String,
    },
    RunFailed {
        error: String,
    },
    RunCancelled {
        message: String,
    },
}

impl RunEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::PlanCreated { .. } => "plan_created",
            RunEvent::TaskStarted { .. } => "task_started",
            RunEvent::TaskRetry { .. } => "task_retry",
            RunEvent::TaskCompleted { .. } => "task_completed",
            RunEvent::TaskFailed { .. } => "task_failed",
            RunEvent::ToolCallStarted { .. } => "tool_call_started",
            RunEvent::ToolCallResult { .. } => "tool_call_result",
            RunEvent::CommandStepStarted { .. } => "command_step_started",
            RunEvent::CommandStepResult { .. } => "command_step_result",
            RunEvent::CommandStepError { .. } => "command_step_error",
            RunEvent::WorkspaceRequired { .. } => "workspace_required",
            RunEvent::ApprovalRequired { .. } => "approval_required",
            RunEvent::ApprovalDecided { .. } => "approval_decided",
            RunEvent::FileArtifact { .. } => "file_artifact",
            RunEvent::RunCompleted { .. } => "run_completed",
            RunEvent::RunFailed { .. } => "run_failed",
            RunEvent::RunCancelled { .. } => "run_cancelled",
        }
    }

    /// Run-level lifecycle events. These are the only events allowed after a
    /// run has been cancelled.
    pub fn is_run_lifecycle(&self) -> bool {
        matches!(
            self,
            RunEvent::RunStarted { .. }
                | RunEvent::RunCompleted { .. }
                | RunEvent::RunFailed { .. }
                | RunEvent::RunCancelled { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub run_id: String,
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// Receiver side of the event stream.
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: EventEnvelope);
}

/// Forwards events over an unbounded channel, e.g. to a UI process.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        // Receiver gone means nobody is observing; the run carries on.
        if self.tx.send(envelope).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event.kind()).collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        if let Ok(mut events) = self.events.lock() {
            events.push(envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let envelope = EventEnvelope {
            run_id: "run-1".into(),
            seq: 4,
            at: Utc::now(),
            event: RunEvent::FileArtifact {
                task_id: "task-1".into(),
                path: "/ws/hello.txt".into(),
                operation: ArtifactOperation::Created,
            },
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], json!("file_artifact"));
        assert_eq!(value["operation"], json!("created"));
        assert_eq!(value["seq"], json!(4));
        assert_eq!(value["run_id"], json!("run-1"));
    }

    #[test]
    fn test_risk_ordering() {
        assert!(!RiskLevel::Low.requires_approval());
        assert!(RiskLevel::Medium.requires_approval());
        assert!(RiskLevel::High > RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelEventSink::new();
        for seq in 0..3 {
            sink.emit(EventEnvelope {
                run_id: "r".into(),
                seq,
                at: Utc::now(),
                event: RunEvent::RunFailed { error: "x".into() },
            });
        }
        drop(sink);
        let mut seen = Vec::new();
        while let Some(envelope) = rx.recv().await {
            seen.push(envelope.seq);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
