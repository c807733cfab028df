//! Terminal approval gate.

use async_trait::async_trait;
use capflow_core::{ApprovalDecision, ApprovalGate, ApprovalRequest, RiskLevel};
use std::io::{self, BufRead, Write};

/// Asks on stderr and reads the answer from stdin. Anything but an explicit
/// yes is a denial.
pub struct ConsoleApprovalGate;

pub fn parse_answer(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

fn prompt(request: &ApprovalRequest) -> io::Result<bool> {
    let level = match request.risk_level {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "HIGH",
    };
    let mut err = io::stderr();
    writeln!(err)?;
    writeln!(err, "Approval needed ({} risk): {}", level, request.reason)?;
    writeln!(err, "  {}", request.command)?;
    write!(err, "Allow? [y/N] ")?;
    err.flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(parse_answer(&input))
}

#[async_trait]
impl ApprovalGate for ConsoleApprovalGate {
    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalDecision {
        let answer = tokio::task::spawn_blocking(move || prompt(&request)).await;
        match answer {
            Ok(Ok(true)) => ApprovalDecision::approve(),
            Ok(Ok(false)) => ApprovalDecision::deny("Denied at the terminal"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Could not read approval answer");
                ApprovalDecision::deny(format!("Could not read approval: {}", e))
            }
            Err(e) => ApprovalDecision::deny(format!("Approval prompt failed: {}", e)),
        }
    }
}
