use rmcp::{
    ServerHandler,
    tool,
    model::{
        ServerCapabilities, Implementation, ProtocolVersion, CallToolResult,
    },
    handler::server::wrapper::Parameters,
    ErrorData as McpError,
};
use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::engine::{EngineSlot, RecommendationEngine};
use crate::errors::RecommendError;
use crate::rerank::RerankProvider;

pub struct RecommendService {
    slot: Arc<EngineSlot>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Arc<dyn RerankProvider>,
    config: Config,
    /// Serializes reloads so two rebuilds never race to publish.
    reload_lock: tokio::sync::Mutex<()>,
    start_time: Instant,
}

impl RecommendService {
    pub fn new(
        slot: Arc<EngineSlot>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<dyn RerankProvider>,
        config: Config,
    ) -> Self {
        Self {
            slot,
            embedder,
            reranker,
            config,
            reload_lock: tokio::sync::Mutex::new(()),
            start_time: Instant::now(),
        }
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Build an engine from the configured corpus path and publish it.
    ///
    /// The previous engine keeps serving until the new one is complete; on failure it
    /// stays published.
    pub async fn rebuild(&self) -> Result<Arc<RecommendationEngine>, RecommendError> {
        let _guard = self.reload_lock.lock().await;
        let engine = RecommendationEngine::from_path(
            &self.config.corpus_path,
            self.embedder.clone(),
            self.reranker.clone(),
            self.config.retrieval.clone(),
            self.config.embedding.batch_size,
        )
        .await?;
        self.slot.publish(engine);
        self.slot.current()
    }

    fn default_k(&self) -> usize {
        self.config.retrieval.default_k
    }
}

// Parameter structs

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct RecommendParams {
    /// Free-text description of the role or skills to assess (required)
    pub query: String,
    /// Number of assessments to return (default: retrieval.default_k); capped by the corpus size
    pub k: Option<u32>,
}

// Helper: convert RecommendError to CallToolResult with isError: true
fn recommend_error_to_result(err: RecommendError) -> CallToolResult {
    match err {
        RecommendError::EngineNotReady => {
            CallToolResult::structured_error(json!({
                "isError": true,
                "error": "Recommendation engine is still loading",
                "hint": "Call health_check until status is 'ready', then retry"
            }))
        }
        RecommendError::CorpusUnavailable { path, reason } => {
            CallToolResult::structured_error(json!({
                "isError": true,
                "error": format!("Corpus unavailable: {}", reason),
                "path": path
            }))
        }
        other => {
            CallToolResult::structured_error(json!({
                "isError": true,
                "error": other.to_string()
            }))
        }
    }
}

// Tool implementations
#[rmcp::tool_router]
impl RecommendService {
    #[tool(description = "Recommend assessments for a job description or skill query. Returns up to k assessments ranked by relevance, each with name, URL, 0-100 score, description and test type codes (K knowledge, P personality, C cognitive, A ability, B behavioral, S simulation).")]
    async fn recommend(
        &self,
        Parameters(params): Parameters<RecommendParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            tool = "recommend",
            k = ?params.k,
            "Tool called"
        );

        if params.query.trim().is_empty() {
            return Ok(CallToolResult::structured_error(json!({
                "isError": true,
                "error": "Field 'query' is required and cannot be empty",
                "field": "query"
            })));
        }

        // Any k is honoured; the result count is bounded by the corpus size.
        let k = params.k.map(|k| k as usize).unwrap_or_else(|| self.default_k());

        match self.slot.recommend(&params.query, k).await {
            Ok(results) => {
                let count = results.len();
                Ok(CallToolResult::structured(json!({
                    "results": results,
                    "count": count,
                    "query": params.query,
                    "k": k,
                })))
            }
            Err(e) => Ok(recommend_error_to_result(e)),
        }
    }

    #[tool(description = "Rebuild the indexes from the configured corpus file and swap them in once complete. Queries keep using the current indexes during the rebuild.")]
    async fn reload_corpus(
        &self,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "reload_corpus", "Tool called");

        match self.rebuild().await {
            Ok(engine) => Ok(CallToolResult::structured(json!({
                "status": "reloaded",
                "engine": engine.stats(),
                "load_report": engine.corpus().report(),
            }))),
            Err(e) => {
                tracing::error!(error = %e, "Corpus reload failed, keeping previous engine");
                Ok(recommend_error_to_result(e))
            }
        }
    }

    #[tool(description = "Check server health and whether the recommendation engine is ready")]
    async fn health_check(
        &self,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "health_check", "Tool called");

        let response = match self.slot.current() {
            Ok(engine) => json!({
                "status": "ready",
                "ready": true,
                "version": env!("CARGO_PKG_VERSION"),
                "uptime_seconds": self.uptime_seconds(),
                "engine": engine.stats(),
            }),
            Err(_) => json!({
                "status": "loading",
                "ready": false,
                "version": env!("CARGO_PKG_VERSION"),
                "uptime_seconds": self.uptime_seconds(),
            }),
        };

        Ok(CallToolResult::structured(response))
    }
}

// ServerHandler implementation
#[rmcp::tool_handler(router = Self::tool_router())]
impl ServerHandler for RecommendService {
    fn get_info(&self) -> rmcp::model::InitializeResult {
        rmcp::model::InitializeResult {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "assessrec".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some("Assessment recommendation server with hybrid retrieval and cross-encoder re-ranking".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Assessment recommender. Tools: recommend (query, optional k), health_check, reload_corpus. Results carry a 0-100 score normalized within each query.".to_string()
            ),
        }
    }
}
