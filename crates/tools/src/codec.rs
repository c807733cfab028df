use async_trait::async_trait;
use capflow_core::{DocumentCodec, EngineError};
use std::path::Path;

/// Plain UTF-8 text, one paragraph per line. Stands in for a rich document
/// format when no dedicated codec is configured.
#[derive(Debug, Clone)]
pub struct PlainTextCodec {
    extension: String,
}

impl PlainTextCodec {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }
}

impl Default for PlainTextCodec {
    fn default() -> Self {
        Self::new("txt")
    }
}

#[async_trait]
impl DocumentCodec for PlainTextCodec {
    fn extension(&self) -> &str {
        &self.extension
    }

    async fn read_text(&self, path: &Path) -> Result<String, EngineError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::Document(format!("{}: {}", path.display(), e)))?;
        Ok(raw.replace("\r\n", "\n"))
    }

    async fn write_text(&self, path: &Path, text: &str) -> Result<(), EngineError> {
        tokio::fs::write(path, text)
            .await
            .map_err(|e| EngineError::Document(format!("{}: {}", path.display(), e)))
    }
}
