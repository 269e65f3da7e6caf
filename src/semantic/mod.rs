/// Dense embedding index over derived texts.
///
/// Every row is L2-normalized at build time so query scoring is a dot product.
/// Row `i` always belongs to corpus record `i`.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::errors::RecommendError;

pub struct SemanticIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    matrix: Vec<Vec<f32>>,
}

impl SemanticIndex {
    /// Embed all `texts` once, `batch_size` texts per provider call.
    pub async fn build(
        embedder: Arc<dyn EmbeddingProvider>,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Self, RecommendError> {
        let pb = if std::io::stderr().is_terminal() {
            ProgressBar::new(texts.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("Embedding corpus [{bar:40}] {pos}/{len} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut matrix = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            let vectors = embedder.embed_batch(chunk).await?;
            if vectors.len() != chunk.len() {
                pb.abandon();
                return Err(RecommendError::Internal(format!(
                    "Embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    chunk.len()
                )));
            }
            if let Some(pos) = vectors.iter().position(|v| !all_finite(v)) {
                pb.abandon();
                return Err(RecommendError::Internal(format!(
                    "Embedding provider returned a non-finite vector for text {}",
                    matrix.len() + pos
                )));
            }
            matrix.extend(vectors.into_iter().map(normalized));
            pb.inc(chunk.len() as u64);
        }
        pb.finish_and_clear();

        tracing::info!(
            rows = matrix.len(),
            model = embedder.model_name(),
            dimension = embedder.dimension(),
            "Semantic index built"
        );

        Ok(SemanticIndex { embedder, matrix })
    }

    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Cosine similarity of `query` against every row, in corpus order.
    pub async fn score(&self, query: &str) -> Result<Vec<f32>, RecommendError> {
        let q = self.embedder.embed(query).await?;
        if !all_finite(&q) {
            return Err(RecommendError::Internal(
                "Embedding provider returned a non-finite query vector".to_string(),
            ));
        }
        let q = normalized(q);
        Ok(self.matrix.iter().map(|row| dot(&q, row)).collect())
    }
}

fn all_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use async_trait::async_trait;

    /// Maps a text onto counts of a few marker words.
    struct MarkerEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MarkerEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let lower = text.to_lowercase();
            Ok(["java", "team", "python"]
                .iter()
                .map(|w| lower.matches(w).count() as f32)
                .collect())
        }

        fn model_name(&self) -> &str {
            "marker"
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0])
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![1.0]])
        }

        fn model_name(&self) -> &str {
            "short"
        }

        fn dimension(&self) -> usize {
            1
        }
    }

    /// Embeds the corpus normally but yields NaN for any text mentioning "broken".
    struct NanEmbedder;

    #[async_trait]
    impl EmbeddingProvider for NanEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.contains("broken") {
                Ok(vec![f32::NAN, 1.0, 0.0])
            } else {
                MarkerEmbedder.embed(text).await
            }
        }

        fn model_name(&self) -> &str {
            "nan"
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn texts() -> Vec<String> {
        vec![
            "Java java test".to_string(),
            "Team work".to_string(),
            "Nothing relevant".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_scores_are_cosine() {
        let index = SemanticIndex::build(Arc::new(MarkerEmbedder), &texts(), 2).await.unwrap();
        assert_eq!(index.len(), 3);
        let scores = index.score("java").await.unwrap();
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert_eq!(scores[1], 0.0);
        // Zero vectors never divide by zero.
        assert_eq!(scores[2], 0.0);
    }

    #[tokio::test]
    async fn test_row_count_mismatch_is_error() {
        let result = SemanticIndex::build(Arc::new(ShortEmbedder), &texts(), 8).await;
        assert!(matches!(result, Err(RecommendError::Internal(_))));
    }

    #[tokio::test]
    async fn test_non_finite_query_vector_is_error() {
        let index = SemanticIndex::build(Arc::new(NanEmbedder), &texts(), 2).await.unwrap();
        assert!(index.score("java").await.is_ok());
        let result = index.score("broken query").await;
        assert!(matches!(result, Err(RecommendError::Internal(_))));
    }

    #[tokio::test]
    async fn test_non_finite_corpus_vector_is_error() {
        let mut corpus = texts();
        corpus.push("broken record".to_string());
        let result = SemanticIndex::build(Arc::new(NanEmbedder), &corpus, 2).await;
        match result {
            Err(RecommendError::Internal(msg)) => assert!(msg.contains("text 3"), "{}", msg),
            _ => panic!("expected Internal error"),
        }
    }
}
