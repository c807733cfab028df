//! Runtime configuration loader.

use crate::error::ConfigError;
use capflow_core::{BoundedLoopOptions, ModelConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    pub max_tasks: usize,
    pub temperature: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_tasks: 6,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Tool-use rounds before the judgement is forced.
    pub max_rounds: u32,
    /// Dispatches of one retrieval task before it fails.
    pub max_attempts: u32,
    pub top_k: usize,
    pub loop_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            max_attempts: 2,
            top_k: 8,
            loop_timeout_ms: 60_000,
        }
    }
}

impl RetrievalConfig {
    pub fn loop_options(&self) -> BoundedLoopOptions {
        BoundedLoopOptions::new(self.max_rounds, self.loop_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandConfig {
    pub max_steps: u32,
    pub loop_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_steps: 12,
            loop_timeout_ms: 180_000,
            command_timeout_ms: 60_000,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl CommandConfig {
    pub fn loop_options(&self) -> BoundedLoopOptions {
        BoundedLoopOptions::new(self.max_steps, self.loop_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentConfig {
    pub max_steps: u32,
    pub loop_timeout_ms: u64,
    pub preview_chars: usize,
    pub extension: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            loop_timeout_ms: 120_000,
            preview_chars: 800,
            extension: "docx".to_string(),
        }
    }
}

impl DocumentConfig {
    pub fn loop_options(&self) -> BoundedLoopOptions {
        BoundedLoopOptions::new(self.max_steps, self.loop_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    /// Host/capability iterations before a run is aborted.
    pub max_steps: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { max_steps: 64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_messages: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_messages: 12 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key, if any.
    pub api_key_env: String,
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.1".to_string(),
            api_key_env: "CAPFLOW_API_KEY".to_string(),
            temperature: 0.2,
        }
    }
}

impl ModelSettings {
    pub fn api_key(&self) -> Option<String> {
        if self.api_key_env.trim().is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            provider: "openai_compatible".to_string(),
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub planner: PlannerConfig,
    pub retrieval: RetrievalConfig,
    pub command: CommandConfig,
    pub document: DocumentConfig,
    pub graph: GraphConfig,
    pub history: HistoryConfig,
    pub model: ModelSettings,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let caps = [
            ("planner.max_tasks", self.planner.max_tasks as u64),
            ("retrieval.max_rounds", self.retrieval.max_rounds as u64),
            ("retrieval.max_attempts", self.retrieval.max_attempts as u64),
            ("retrieval.top_k", self.retrieval.top_k as u64),
            ("retrieval.loop_timeout_ms", self.retrieval.loop_timeout_ms),
            ("command.max_steps", self.command.max_steps as u64),
            ("command.loop_timeout_ms", self.command.loop_timeout_ms),
            ("command.command_timeout_ms", self.command.command_timeout_ms),
            ("command.max_output_bytes", self.command.max_output_bytes as u64),
            ("document.max_steps", self.document.max_steps as u64),
            ("document.loop_timeout_ms", self.document.loop_timeout_ms),
            ("graph.max_steps", self.graph.max_steps as u64),
        ];
        if let Some((name, _)) = caps.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
        }
        if self.model.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model.model must not be empty".to_string()));
        }
        if self.document.extension.trim().trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid("document.extension must not be empty".to_string()));
        }
        Ok(())
    }

    /// `CAPFLOW_MODEL` and `CAPFLOW_BASE_URL` win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(model) = env_value("CAPFLOW_MODEL") {
            self.model.model = model;
        }
        if let Some(base_url) = env_value("CAPFLOW_BASE_URL") {
            self.model.base_url = base_url;
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load, apply environment overrides, and validate.
pub fn load_runtime_config(path: impl AsRef<Path>) -> Result<RuntimeConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let mut config: RuntimeConfig = if content.trim().is_empty() {
        RuntimeConfig::default()
    } else {
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capflow.yaml");
        fs::write(&path, "command:\n  max_steps: 4\ndocument:\n  extension: txt\n").unwrap();

        let config = load_runtime_config(&path).unwrap();
        assert_eq!(config.command.max_steps, 4);
        assert_eq!(config.command.command_timeout_ms, 60_000);
        assert_eq!(config.document.extension, "txt");
        assert_eq!(config.retrieval.max_rounds, 3);
    }

    #[test]
    fn test_empty_file_is_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capflow.yaml");
        fs::write(&path, "  \n").unwrap();
        let config = load_runtime_config(&path).unwrap();
        assert_eq!(config.graph.max_steps, 64);
    }

    #[test]
    fn test_zero_cap_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capflow.yaml");
        fs::write(&path, "retrieval:\n  max_rounds: 0\n").unwrap();

        match load_runtime_config(&path) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("retrieval.max_rounds")),
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_and_malformed() {
        assert!(matches!(
            load_runtime_config("/nonexistent/capflow.yaml"),
            Err(ConfigError::NotFound(_))
        ));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capflow.yaml");
        fs::write(&path, "planner: [unclosed").unwrap();
        assert!(matches!(load_runtime_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_empty_model_rejected() {
        let mut config = RuntimeConfig::default();
        config.model.model = " ".into();
        assert!(config.validate().is_err());
    }
}
