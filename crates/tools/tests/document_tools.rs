#![allow(clippy::unwrap_used)]

mod common;

use capflow_core::{ArtifactOperation, ResultCode};
use capflow_tools::*;
use common::*;
use serde_json::json;
use std::sync::Arc;

struct DocTools {
    inspect: Arc<dyn Tool>,
    apply: Arc<dyn Tool>,
    save: Arc<dyn Tool>,
    finish: FinishSlot,
    session: DocumentSession,
}

fn doc_tools(h: &Harness) -> DocTools {
    let finish = FinishSlot::new();
    let session = DocumentSession::new();
    let mut tools = document_tools(
        DocumentToolConfig {
            task_id: "task-doc".into(),
            workspace_root: h.root.clone(),
            source_path: Some("memo.docx".into()),
            output_path: None,
            preview_chars: 40,
        },
        session.clone(),
        finish.clone(),
    )
    .into_iter();
    DocTools {
        inspect: tools.next().unwrap(),
        apply: tools.next().unwrap(),
        save: tools.next().unwrap(),
        finish,
        session,
    }
}

fn write_memo(h: &Harness) {
    std::fs::write(
        h.root.join("memo.docx"),
        "Quarterly memo\nRevenue grew in Q3.\nThanks, Team",
    )
    .unwrap();
}

#[tokio::test]
async fn test_inspect_then_replace_reports_one_applied() {
    let h = harness(true);
    write_memo(&h);
    let t = doc_tools(&h);

    let inspected = t.inspect.execute(&h.ctx, json!({})).await.unwrap();
    assert_eq!(inspected.output["paragraphCount"], json!(3));

    let applied = t
        .apply
        .execute(
            &h.ctx,
            json!({"edits": [{"op": "replace_text", "find": "Q3", "replace": "Q4"}]}),
        )
        .await
        .unwrap();
    assert!(applied.success);
    assert_eq!(applied.output["appliedCount"], json!(1));
    assert_eq!(applied.output["failures"], json!([]));
}

#[tokio::test]
async fn test_save_new_output_emits_created() {
    let h = harness(false);
    write_memo(&h);
    let t = doc_tools(&h);

    t.inspect.execute(&h.ctx, json!({})).await.unwrap();
    t.apply
        .execute(&h.ctx, json!({"edits": [{"op": "append_paragraph", "text": "P.S."}]}))
        .await
        .unwrap();
    let saved = t.save.execute(&h.ctx, json!({})).await.unwrap();

    let out = h.root.join("memo-edited.docx");
    assert!(saved.success);
    assert!(std::fs::read_to_string(&out).unwrap().ends_with("P.S."));
    assert_eq!(
        artifact_events(&h.events),
        vec![(out.display().to_string(), ArtifactOperation::Created)]
    );
    assert_eq!(h.gate.asked(), 0);
    assert_eq!(t.session.saved_outputs(), vec![out]);
}

#[tokio::test]
async fn test_existing_output_without_overwrite_is_refused() {
    let h = harness(true);
    write_memo(&h);
    let t = doc_tools(&h);

    t.inspect.execute(&h.ctx, json!({})).await.unwrap();
    t.apply
        .execute(
            &h.ctx,
            json!({"edits": [{"op": "replace_text", "find": "memo", "replace": "note"}]}),
        )
        .await
        .unwrap();
    let saved = t
        .save
        .execute(&h.ctx, json!({"output_path": "memo.docx"}))
        .await
        .unwrap();

    assert!(!saved.success);
    assert_eq!(saved.code, Some(ResultCode::ApprovalDenied));
    assert!(std::fs::read_to_string(h.root.join("memo.docx"))
        .unwrap()
        .contains("Quarterly memo"));
    assert!(artifact_events(&h.events).is_empty());
    assert!(t.finish.get().is_none());
}

#[tokio::test]
async fn test_overwrite_denied_writes_nothing() {
    let h = harness(false);
    write_memo(&h);
    let t = doc_tools(&h);

    t.inspect.execute(&h.ctx, json!({})).await.unwrap();
    t.apply
        .execute(
            &h.ctx,
            json!({"edits": [{"op": "replace_text", "find": "memo", "replace": "note"}]}),
        )
        .await
        .unwrap();
    let saved = t
        .save
        .execute(&h.ctx, json!({"output_path": "memo.docx", "overwrite": true}))
        .await
        .unwrap();

    assert!(!saved.success);
    assert_eq!(saved.code, Some(ResultCode::ApprovalDenied));
    assert_eq!(h.gate.asked(), 1);
    assert!(std::fs::read_to_string(h.root.join("memo.docx"))
        .unwrap()
        .contains("Quarterly memo"));
    assert!(artifact_events(&h.events).is_empty());
    assert_eq!(t.finish.get().unwrap().result_code, ResultCode::ApprovalDenied);
}

#[tokio::test]
async fn test_overwrite_approved_emits_updated() {
    let h = harness(true);
    write_memo(&h);
    let t = doc_tools(&h);

    t.inspect.execute(&h.ctx, json!({})).await.unwrap();
    t.apply
        .execute(
            &h.ctx,
            json!({"edits": [{"op": "replace_text", "find": "memo", "replace": "note"}]}),
        )
        .await
        .unwrap();
    let saved = t
        .save
        .execute(&h.ctx, json!({"output_path": "memo.docx", "overwrite": true}))
        .await
        .unwrap();

    let path = h.root.join("memo.docx");
    assert!(saved.success);
    assert!(std::fs::read_to_string(&path).unwrap().contains("Quarterly note"));
    assert_eq!(
        artifact_events(&h.events),
        vec![(path.display().to_string(), ArtifactOperation::Updated)]
    );
}

#[tokio::test]
async fn test_save_rejects_wrong_extension_and_escape() {
    let h = harness(true);
    write_memo(&h);
    let t = doc_tools(&h);
    t.inspect.execute(&h.ctx, json!({})).await.unwrap();

    let wrong_ext = t
        .save
        .execute(&h.ctx, json!({"output_path": "memo.txt"}))
        .await;
    assert!(matches!(wrong_ext, Err(ToolError::Validation(_))));

    let escape = t
        .save
        .execute(&h.ctx, json!({"output_path": "../memo.docx"}))
        .await;
    assert!(matches!(escape, Err(ToolError::Sandbox(_))));
}

#[tokio::test]
async fn test_apply_before_inspect_is_invalid() {
    let h = harness(true);
    let t = doc_tools(&h);
    let err = t
        .apply
        .execute(&h.ctx, json!({"edits": [{"op": "append_paragraph", "text": "x"}]}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ResultCode::InvalidInput);
}
