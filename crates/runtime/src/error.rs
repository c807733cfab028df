use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid YAML: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections from the run trigger.
#[derive(Error, Debug, PartialEq)]
pub enum ServiceError {
    #[error("Input must not be empty")]
    EmptyInput,

    #[error("Invalid workspace: {0}")]
    InvalidWorkspace(String),

    #[error("Run already in progress: {0}")]
    AlreadyRunning(String),
}
