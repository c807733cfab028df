use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Path traversal detected: {0}")]
    ParentTraversal(String),
    #[error("Path escapes workspace: {0}")]
    OutsideWorkspace(String),
    #[error("Invalid workspace root: {0}")]
    InvalidRoot(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
