/// Local cross-encoder using fastembed's `TextRerank`.
///
/// Weights are downloaded once into the cache directory. Inference is CPU-bound and
/// runs on the blocking pool behind a Mutex.

use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task;

use super::{RerankError, RerankProvider};

/// Model names accepted in `reranker.model`.
pub const SUPPORTED_MODELS: &[&str] = &[
    "bge-reranker-base",
    "bge-reranker-v2-m3",
    "jina-reranker-v1-turbo-en",
    "jina-reranker-v2-base-multilingual",
];

fn resolve_model(name: &str) -> Result<RerankerModel, RerankError> {
    match name {
        "bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" => Ok(RerankerModel::BGERerankerV2M3),
        "jina-reranker-v1-turbo-en" => Ok(RerankerModel::JINARerankerV1TurboEn),
        "jina-reranker-v2-base-multilingual" => Ok(RerankerModel::JINARerankerV2BaseMultiligual),
        other => Err(RerankError::NotConfigured(format!(
            "Unknown reranker model '{}'. Supported: {}",
            other,
            SUPPORTED_MODELS.join(", ")
        ))),
    }
}

pub struct LocalRerankProvider {
    model: Arc<Mutex<TextRerank>>,
    name: String,
}

impl LocalRerankProvider {
    /// Load (downloading if needed) the named cross-encoder.
    pub async fn new(model_name: &str, cache_dir: &str) -> Result<Self, RerankError> {
        let variant = resolve_model(model_name)?;
        let cache_path = PathBuf::from(cache_dir);

        let model = task::spawn_blocking(move || {
            std::fs::create_dir_all(&cache_path)
                .map_err(|e| RerankError::ModelInit(format!("Failed to create cache dir: {}", e)))?;
            let options = RerankInitOptions::new(variant)
                .with_cache_dir(cache_path)
                .with_show_download_progress(false);
            TextRerank::try_new(options).map_err(|e| RerankError::ModelInit(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::ModelInit(e.to_string()))??;

        tracing::info!(model = model_name, "Local reranker loaded");

        Ok(LocalRerankProvider {
            model: Arc::new(Mutex::new(model)),
            name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl RerankProvider for LocalRerankProvider {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents = documents.to_vec();
        let count = documents.len();

        let results = task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| RerankError::Generation("fastembed lock poisoned".to_string()))?;
            let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
            model
                .rerank(query.as_str(), &docs, false, None)
                .map_err(|e| RerankError::Generation(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::Generation(e.to_string()))??;

        // fastembed returns results sorted by score; put them back in input order.
        let mut scores = vec![f32::NAN; count];
        for r in results {
            if let Some(slot) = scores.get_mut(r.index) {
                *slot = r.score;
            }
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(RerankError::Generation(
                "reranker did not score every document".to_string(),
            ));
        }
        Ok(scores)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_supported_models() {
        for name in SUPPORTED_MODELS {
            assert!(resolve_model(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_resolve_unknown_model() {
        assert!(matches!(
            resolve_model("ms-marco-MiniLM-L-6-v2"),
            Err(RerankError::NotConfigured(_))
        ));
    }
}
