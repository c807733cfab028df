#![allow(clippy::unwrap_used)]

mod common;

use capflow_core::{ArtifactOperation, ResultCode, RunEvent};
use capflow_tools::*;
use common::*;
use serde_json::json;

fn command_tool(h: &Harness, finish: FinishSlot) -> RunCommandTool {
    command_tool_with_timeout(h, finish, 5_000)
}

fn command_tool_with_timeout(h: &Harness, finish: FinishSlot, timeout_ms: u64) -> RunCommandTool {
    RunCommandTool::new(
        CommandToolConfig {
            task_id: "task-1".into(),
            workspace_root: h.root.clone(),
            default_cwd: h.root.clone(),
            command_timeout_ms: timeout_ms,
            max_output_bytes: 4096,
        },
        finish,
    )
}

#[tokio::test]
async fn test_redirect_creates_one_artifact() {
    let h = harness(true);
    let tool = command_tool(&h, FinishSlot::new());

    let result = tool
        .execute(&h.ctx, json!({"command": "printf 'hello' > hello.txt"}))
        .await
        .unwrap();

    assert!(result.success);
    let path = h.root.join("hello.txt");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    assert_eq!(
        artifact_events(&h.events),
        vec![(path.display().to_string(), ArtifactOperation::Created)]
    );
    assert_eq!(h.gate.asked(), 1);
}

#[tokio::test]
async fn test_low_risk_command_needs_no_approval() {
    let h = harness(false);
    std::fs::write(h.root.join("notes.txt"), "a\nb\n").unwrap();
    let tool = command_tool(&h, FinishSlot::new());

    let result = tool
        .execute(&h.ctx, json!({"command": "wc -l notes.txt"}))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output["stdout"].as_str().unwrap().trim(), "2 notes.txt");
    assert_eq!(h.gate.asked(), 0);
    assert_eq!(
        h.events.kinds(),
        vec!["command_step_started", "command_step_result"]
    );
}

#[tokio::test]
async fn test_denied_command_is_never_spawned() {
    let h = harness(false);
    let finish = FinishSlot::new();
    let tool = command_tool(&h, finish.clone());

    let result = tool
        .execute(&h.ctx, json!({"command": "touch created.txt"}))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.code, Some(ResultCode::ApprovalDenied));
    assert!(!h.root.join("created.txt").exists());
    assert_eq!(finish.get().unwrap().result_code, ResultCode::ApprovalDenied);
    assert!(!h.events.kinds().contains(&"command_step_started"));
}

#[tokio::test]
async fn test_boundary_violation_never_executes() {
    let h = harness(true);
    let tool = command_tool(&h, FinishSlot::new());

    for command in [
        "cat ../outside.txt",
        "ls /etc",
        "touch ~/x",
        "cat $HOME/.profile",
        "cat ${HOME}/.bashrc",
        "cc -o/etc/evil x.c",
    ] {
        let err = tool
            .execute(&h.ctx, json!({"command": command}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(_)), "{}", command);
    }
    assert_eq!(h.gate.asked(), 0);
    assert!(h
        .events
        .kinds()
        .iter()
        .all(|k| *k == "command_step_error"));
}

#[tokio::test]
async fn test_cwd_escape_is_rejected() {
    let h = harness(true);
    let tool = command_tool(&h, FinishSlot::new());

    let err = tool
        .execute(&h.ctx, json!({"command": "ls", "cwd": "/tmp"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Sandbox(_)));
}

#[tokio::test]
async fn test_timeout_is_reported_not_fatal() {
    let h = harness(true);
    let finish = FinishSlot::new();
    let tool = command_tool(&h, finish.clone());

    let result = tool
        .execute(&h.ctx, json!({"command": "sleep 5", "timeout_ms": 100}))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.output["timedOut"], json!(true));
    assert!(finish.get().is_none());

    let timed_out = h.events.events().into_iter().any(|e| {
        matches!(e.event, RunEvent::CommandStepResult { timed_out: true, .. })
    });
    assert!(timed_out);
}

#[tokio::test]
async fn test_requested_timeout_is_capped_by_config() {
    let h = harness(true);
    let tool = command_tool_with_timeout(&h, FinishSlot::new(), 200);

    let started = std::time::Instant::now();
    let result = tool
        .execute(&h.ctx, json!({"command": "sleep 5", "timeout_ms": 86_400_000}))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.output["timedOut"], json!(true));
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
}

#[tokio::test]
async fn test_cancelled_context_rejects_tool_entry() {
    let h = harness(true);
    h.cancel.cancel();
    let tool = command_tool(&h, FinishSlot::new());

    let err = tool
        .execute(&h.ctx, json!({"command": "ls"}))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn test_finish_tool_records_completion() {
    let h = harness(true);
    let slot = FinishSlot::new();
    let finish = FinishTool::new(slot.clone());

    finish
        .execute(&h.ctx, json!({"success": true, "summary": "listed files"}))
        .await
        .unwrap();
    let record = slot.get().unwrap();
    assert!(record.success);
    assert_eq!(record.result_code, ResultCode::Ok);

    let bad = FinishTool::new(FinishSlot::new())
        .execute(&h.ctx, json!({"success": true, "summary": "x", "result_code": "failed"}))
        .await;
    assert!(matches!(bad, Err(ToolError::Validation(_))));
}
