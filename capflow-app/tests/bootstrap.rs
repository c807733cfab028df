use capflow_app::bootstrap::{collaborators, load_config};
use capflow_core::CollectingEventSink;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_load_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("capflow.yaml");
    std::fs::write(&path, "document:\n  extension: md\ncommand:\n  max_steps: 5\n").unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.document.extension, "md");
    assert_eq!(config.command.max_steps, 5);

    let collab = collaborators(&config, true, Arc::new(CollectingEventSink::new()));
    assert_eq!(collab.documents.extension(), "md");
    assert!(collab.embedder.is_none());
}

#[test]
fn test_missing_config_file_is_an_error() {
    let err = load_config(Some(std::path::Path::new("/nonexistent/capflow.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Failed to load config"));
}
