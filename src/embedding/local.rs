/// Local embedding provider using fastembed
///
/// Provides offline embedding generation with ONNX sentence-embedding models.
/// No API key required — model weights are downloaded and cached locally.
/// All CPU-bound fastembed calls are wrapped in spawn_blocking to avoid blocking async runtime.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task;

use super::{EmbeddingError, EmbeddingProvider};

/// Model names accepted in `embedding.model`, with their fastembed variant and dimension.
pub const SUPPORTED_MODELS: &[(&str, usize)] = &[
    ("all-MiniLM-L6-v2", 384),
    ("all-MiniLM-L12-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("paraphrase-multilingual-mpnet-base-v2", 768),
];

fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    let model = match name {
        "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
        "all-MiniLM-L12-v2" => EmbeddingModel::AllMiniLML12V2,
        "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "paraphrase-multilingual-mpnet-base-v2" => EmbeddingModel::ParaphraseMLMpnetBaseV2,
        other => {
            return Err(EmbeddingError::NotConfigured(format!(
                "Unknown local embedding model '{}'. Supported: {}",
                other,
                SUPPORTED_MODELS.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(", ")
            )))
        }
    };
    let dim = SUPPORTED_MODELS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
        .unwrap_or(384);
    Ok((model, dim))
}

/// Local embedding provider backed by fastembed.
///
/// fastembed inference needs exclusive access to the session, so the model sits
/// behind a Mutex and every call runs on the blocking pool.
pub struct LocalEmbeddingProvider {
    model: Arc<Mutex<TextEmbedding>>,
    name: String,
    dim: usize,
    batch_size: usize,
}

impl LocalEmbeddingProvider {
    /// Create a new LocalEmbeddingProvider, downloading model weights if not cached.
    ///
    /// # Arguments
    /// * `model_name` - One of `SUPPORTED_MODELS`
    /// * `cache_dir` - Directory to cache model weights (fastembed downloads on first use)
    /// * `batch_size` - Texts per inference call in `embed_batch`
    pub async fn new(model_name: &str, cache_dir: &str, batch_size: usize) -> Result<Self, EmbeddingError> {
        let (variant, dim) = resolve_model(model_name)?;
        let cache_path = PathBuf::from(cache_dir);

        let model = task::spawn_blocking(move || {
            std::fs::create_dir_all(&cache_path)
                .map_err(|e| EmbeddingError::ModelInit(format!("Failed to create cache dir: {}", e)))?;
            let options = InitOptions::new(variant)
                .with_cache_dir(cache_path)
                .with_show_download_progress(false);
            TextEmbedding::try_new(options).map_err(|e| EmbeddingError::ModelInit(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))??;

        tracing::info!(model = model_name, dimension = dim, "Local embedding model loaded");

        Ok(LocalEmbeddingProvider {
            model: Arc::new(Mutex::new(model)),
            name: model_name.to_string(),
            dim,
            batch_size: batch_size.max(1),
        })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::Generation("fastembed lock poisoned".to_string()))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Generation(e.to_string()))?
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Generation("fastembed returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.to_vec()).await
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        for (name, dim) in SUPPORTED_MODELS {
            let (_, resolved) = resolve_model(name).unwrap();
            assert_eq!(resolved, *dim);
        }
    }

    #[test]
    fn test_resolve_unknown_model() {
        let err = resolve_model("all-mpnet-base-v3").unwrap_err();
        assert!(matches!(err, EmbeddingError::NotConfigured(_)));
    }
}
