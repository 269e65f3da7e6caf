/// Recommendation engine: corpus, both indexes and the re-ranker wired together.
///
/// An engine is built once and never mutated. Request handlers share it through
/// `EngineSlot`, which publishes a fully built engine in one step so a reload never
/// exposes a half-built index.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::balance;
use crate::config::RetrievalConfig;
use crate::corpus::Corpus;
use crate::embedding::EmbeddingProvider;
use crate::errors::RecommendError;
use crate::lexical::TfidfIndex;
use crate::rerank::{self, Recommendation, RerankProvider};
use crate::search::{hybrid_candidates, HybridWeights};
use crate::semantic::SemanticIndex;

pub struct RecommendationEngine {
    corpus: Corpus,
    lexical: TfidfIndex,
    semantic: SemanticIndex,
    reranker: Arc<dyn RerankProvider>,
    settings: RetrievalConfig,
    built_at: DateTime<Utc>,
}

/// Snapshot of an engine for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub records: usize,
    pub vocabulary: usize,
    pub embedding_model: String,
    pub reranker_model: String,
    pub built_at: String,
}

impl RecommendationEngine {
    /// Build both indexes over `corpus`.
    ///
    /// Fails with `EmptyCorpus` only when `settings.allow_empty_corpus` is false.
    pub async fn build(
        corpus: Corpus,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<dyn RerankProvider>,
        settings: RetrievalConfig,
        batch_size: usize,
    ) -> Result<Self, RecommendError> {
        if corpus.is_empty() {
            if !settings.allow_empty_corpus {
                return Err(RecommendError::EmptyCorpus);
            }
            tracing::warn!("Building engine over an empty corpus, every query will return no results");
        }

        let texts = corpus.texts().to_vec();
        let max_features = settings.max_features;
        let lexical = tokio::task::spawn_blocking(move || TfidfIndex::build(&texts, max_features))
            .await
            .map_err(|e| RecommendError::Internal(format!("TF-IDF build task failed: {}", e)))??;

        let semantic = SemanticIndex::build(embedder, corpus.texts(), batch_size).await?;

        if lexical.len() != corpus.len() || semantic.len() != corpus.len() {
            return Err(RecommendError::Internal(format!(
                "Index sizes diverged: corpus={}, lexical={}, semantic={}",
                corpus.len(),
                lexical.len(),
                semantic.len()
            )));
        }

        tracing::info!(
            records = corpus.len(),
            vocabulary = lexical.vocabulary_size(),
            embedding_model = semantic.model_name(),
            reranker_model = reranker.model_name(),
            "Recommendation engine built"
        );

        Ok(RecommendationEngine {
            corpus,
            lexical,
            semantic,
            reranker,
            settings,
            built_at: Utc::now(),
        })
    }

    /// Load the corpus at `path` and build an engine over it.
    pub async fn from_path(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<dyn RerankProvider>,
        settings: RetrievalConfig,
        batch_size: usize,
    ) -> Result<Self, RecommendError> {
        let corpus = Corpus::load(path)?;
        Self::build(corpus, embedder, reranker, settings, batch_size).await
    }

    /// Up to `k` recommendations for `query`, best first.
    ///
    /// Pipeline: hybrid scoring over the whole corpus, cross-encoder re-ranking of the
    /// shortlist, then domain balancing.
    pub async fn recommend(&self, query: &str, k: usize) -> Result<Vec<Recommendation>, RecommendError> {
        if k == 0 || self.corpus.is_empty() {
            return Ok(Vec::new());
        }

        let semantic = self.semantic.score(query).await?;
        let lexical = self.lexical.score(query);

        let weights = HybridWeights {
            semantic: self.settings.semantic_weight,
            lexical: self.settings.lexical_weight,
        };
        // The shortlist always covers k so large requests are not cut at the pool size.
        let pool = self.settings.candidate_pool.max(k);
        let candidates = hybrid_candidates(&semantic, &lexical, weights, pool);

        let reranked = rerank::rerank(
            self.reranker.as_ref(),
            query,
            &self.corpus,
            &candidates,
            self.settings.description_chars,
        )
        .await?;

        let results = balance::balance(query, reranked, k);
        tracing::info!(
            query = %query,
            k,
            candidates = candidates.len(),
            returned = results.len(),
            "Recommendation served"
        );
        Ok(results)
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn default_k(&self) -> usize {
        self.settings.default_k
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            records: self.corpus.len(),
            vocabulary: self.lexical.vocabulary_size(),
            embedding_model: self.semantic.model_name().to_string(),
            reranker_model: self.reranker.model_name().to_string(),
            built_at: self.built_at.to_rfc3339(),
        }
    }
}

/// Shared handle to the currently published engine.
///
/// Empty until the first successful build. `publish` replaces the engine atomically;
/// requests already holding an `Arc` finish against the engine they started with.
#[derive(Default)]
pub struct EngineSlot {
    current: RwLock<Option<Arc<RecommendationEngine>>>,
}

impl EngineSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, engine: RecommendationEngine) {
        let engine = Arc::new(engine);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(engine);
    }

    pub fn is_ready(&self) -> bool {
        self.current
            .read()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }

    /// The published engine, or `EngineNotReady`.
    pub fn current(&self) -> Result<Arc<RecommendationEngine>, RecommendError> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or(RecommendError::EngineNotReady)
    }

    pub async fn recommend(&self, query: &str, k: usize) -> Result<Vec<Recommendation>, RecommendError> {
        let engine = self.current()?;
        engine.recommend(query, k).await
    }
}
