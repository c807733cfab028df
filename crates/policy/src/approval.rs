use async_trait::async_trait;
use capflow_core::{ApprovalDecision, ApprovalGate, ApprovalRequest};

/// Answers every approval request the same way. Used for unattended runs
/// (`--yes`) and for tests.
#[derive(Debug, Clone)]
pub struct StaticApprovalGate {
    approve: bool,
    reason: Option<String>,
}

impl StaticApprovalGate {
    pub fn allow_all() -> Self {
        Self {
            approve: true,
            reason: None,
        }
    }

    pub fn deny_all(reason: impl Into<String>) -> Self {
        Self {
            approve: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
impl ApprovalGate for StaticApprovalGate {
    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalDecision {
        if self.approve {
            tracing::info!(command = %request.command, risk = ?request.risk_level, "Auto-approved");
            ApprovalDecision::approve()
        } else {
            tracing::warn!(command = %request.command, risk = ?request.risk_level, "Auto-denied");
            ApprovalDecision::deny(
                self.reason
                    .clone()
                    .unwrap_or_else(|| "Denied by policy".to_string()),
            )
        }
    }
}
