//! Config loading and collaborator wiring for the CLI.

use crate::console::ConsoleApprovalGate;
use anyhow::{Context, Result};
use async_trait::async_trait;
use capflow_core::{
    ApprovalGate, ChunkHit, Collaborators, EngineError, EventSink, InMemoryHistory, KnowledgeIndex,
    SearchRequest,
};
use capflow_policy::StaticApprovalGate;
use capflow_providers::OpenAICompatibleProvider;
use capflow_runtime::{load_runtime_config, RuntimeConfig};
use capflow_tools::PlainTextCodec;
use std::path::Path;
use std::sync::Arc;

/// Knowledge index used when no store is attached. Every search is empty.
pub struct EmptyKnowledge;

#[async_trait]
impl KnowledgeIndex for EmptyKnowledge {
    async fn search(&self, request: SearchRequest) -> Result<Vec<ChunkHit>, EngineError> {
        tracing::debug!(query = %request.query, "No knowledge index attached");
        Ok(Vec::new())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => load_runtime_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let mut config = RuntimeConfig::default();
            config.apply_env_overrides();
            config.validate().context("Invalid default config")?;
            Ok(config)
        }
    }
}

pub fn collaborators(
    config: &RuntimeConfig,
    auto_approve: bool,
    events: Arc<dyn EventSink>,
) -> Collaborators {
    let model = OpenAICompatibleProvider::new(
        config.model.base_url.clone(),
        config.model.api_key(),
        config.model.model.clone(),
    )
    .with_temperature(config.model.temperature);

    let approvals: Arc<dyn ApprovalGate> = if auto_approve {
        Arc::new(StaticApprovalGate::allow_all())
    } else {
        Arc::new(ConsoleApprovalGate)
    };

    Collaborators {
        model: Arc::new(model),
        knowledge: Arc::new(EmptyKnowledge),
        embedder: None,
        documents: Arc::new(PlainTextCodec::new(config.document.extension.clone())),
        approvals,
        history: Arc::new(InMemoryHistory::new()),
        events,
        model_config: config.model.model_config(),
    }
}
