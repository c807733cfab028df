//! Read-only knowledge-index search tools.

use crate::error::ToolError;
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use capflow_core::{ChunkHit, RunContext, SearchMode, SearchRequest};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Restrictions applied to every search in one retrieval invocation.
#[derive(Debug, Clone, Default)]
pub struct SearchScope {
    pub document_ids: Vec<String>,
    pub source_type: Option<String>,
    pub top_k: usize,
}

/// Every hit returned during one retrieval invocation, in order.
#[derive(Debug, Clone, Default)]
pub struct EvidenceLog {
    hits: Arc<Mutex<Vec<ChunkHit>>>,
}

impl EvidenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, hits: &[ChunkHit]) {
        if let Ok(mut log) = self.hits.lock() {
            log.extend_from_slice(hits);
        }
    }

    pub fn hits(&self) -> Vec<ChunkHit> {
        self.hits.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.hits.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

pub struct SearchTool {
    mode: SearchMode,
    scope: SearchScope,
    evidence: EvidenceLog,
}

impl SearchTool {
    pub fn new(mode: SearchMode, scope: SearchScope, evidence: EvidenceLog) -> Self {
        Self {
            mode,
            scope,
            evidence,
        }
    }
}

/// Hybrid, vector and full-text search over the same scope.
pub fn search_tools(scope: SearchScope, evidence: EvidenceLog) -> Vec<Arc<dyn Tool>> {
    [SearchMode::Hybrid, SearchMode::Vector, SearchMode::FullText]
        .into_iter()
        .map(|mode| Arc::new(SearchTool::new(mode, scope.clone(), evidence.clone())) as Arc<dyn Tool>)
        .collect()
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        match self.mode {
            SearchMode::Hybrid => "hybrid_search",
            SearchMode::Vector => "vector_search",
            SearchMode::FullText => "fulltext_search",
        }
    }

    fn description(&self) -> &'static str {
        match self.mode {
            SearchMode::Hybrid => "Search the knowledge base combining semantic and keyword matching",
            SearchMode::Vector => "Semantic search over the knowledge base",
            SearchMode::FullText => "Keyword search over the knowledge base",
        }
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &RunContext, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        ctx.ensure_active()?;
        let input: SearchInput = serde_json::from_value(args)?;
        let query = input.query.trim().to_string();
        if query.is_empty() {
            return Err(ToolError::Validation("Empty query".into()));
        }

        let (mode, embedding) = match (self.mode, ctx.embedder()) {
            (SearchMode::FullText, _) => (SearchMode::FullText, None),
            (mode, Some(embedder)) => {
                let embedder = embedder.clone();
                (mode, Some(ctx.guard(embedder.embed(&query)).await?))
            }
            (SearchMode::Hybrid, None) => {
                tracing::debug!("No embedder configured, hybrid search falls back to full text");
                (SearchMode::FullText, None)
            }
            (SearchMode::Vector, None) => {
                return Err(ToolError::Execution(
                    "Vector search is unavailable: no embedding model configured".into(),
                ));
            }
        };

        let limit = input
            .limit
            .unwrap_or(self.scope.top_k)
            .clamp(1, self.scope.top_k.max(1));
        let request = SearchRequest {
            mode,
            query,
            embedding,
            limit,
            document_ids: self.scope.document_ids.clone(),
            source_type: self.scope.source_type.clone(),
        };
        let knowledge = ctx.knowledge().clone();
        let hits = ctx.guard(knowledge.search(request)).await?;
        self.evidence.record(&hits);

        let results: Vec<_> = hits
            .iter()
            .map(|hit| {
                json!({
                    "documentId": hit.document_id,
                    "documentName": hit.document_name,
                    "excerpt": hit.excerpt,
                    "score": hit.score,
                })
            })
            .collect();
        Ok(ToolResult::ok(json!({
            "count": results.len(),
            "results": results,
        })))
    }
}
