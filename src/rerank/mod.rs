/// Cross-encoder re-ranking of the hybrid shortlist.
///
/// A `RerankProvider` scores each (query, derived text) pair jointly. Raw scores are
/// unbounded model logits, so they are min-max scaled to [0, 100] across the batch
/// before sorting; a batch whose scores are all equal gets 50.0 everywhere.

pub mod local;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::corpus::{Corpus, TestType};
use crate::errors::RecommendError;
use crate::search::Candidate;

/// Normalized score given to every candidate when a batch has no spread.
pub const FLAT_BATCH_SCORE: f64 = 50.0;

/// Errors that can occur during re-ranking.
#[derive(Debug, Error)]
pub enum RerankError {
    /// fastembed model initialization failure
    #[error("Reranker initialization error: {0}")]
    ModelInit(String),

    /// Inference failure
    #[error("Reranker scoring error: {0}")]
    Generation(String),

    /// Unknown model or missing setting
    #[error("Reranker not configured: {0}")]
    NotConfigured(String),
}

/// Pairwise relevance model.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// One raw score per document, in the order the documents were given.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError>;

    fn model_name(&self) -> &str;
}

/// One entry of the final recommendation list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(rename = "Assessment name")]
    pub name: String,
    #[serde(rename = "URL")]
    pub url: String,
    /// Batch-normalized relevance in [0, 100]
    #[serde(rename = "Score")]
    pub score: f64,
    #[serde(rename = "Raw Score")]
    pub raw_score: f64,
    #[serde(rename = "Hybrid Score")]
    pub hybrid_score: f64,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Test Type")]
    pub test_type: Vec<TestType>,
}

/// Min-max scale `raw` to [0, 100].
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }
    let min = raw.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return vec![FLAT_BATCH_SCORE; raw.len()];
    }
    raw.iter().map(|&r| (r - min) / range * 100.0).collect()
}

/// Keep the first `max_chars` characters and always append an ellipsis.
pub fn truncate_description(description: &str, max_chars: usize) -> String {
    let mut out: String = description.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Score `candidates` with `provider` and return them best first.
pub async fn rerank(
    provider: &dyn RerankProvider,
    query: &str,
    corpus: &Corpus,
    candidates: &[Candidate],
    description_chars: usize,
) -> Result<Vec<Recommendation>, RecommendError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let documents: Vec<String> = candidates
        .iter()
        .map(|c| corpus.text(c.index).to_string())
        .collect();
    let raw = provider.score(query, &documents).await?;
    if raw.len() != candidates.len() {
        return Err(RecommendError::Internal(format!(
            "Reranker returned {} scores for {} candidates",
            raw.len(),
            candidates.len()
        )));
    }

    if let Some(pos) = raw.iter().position(|s| !s.is_finite()) {
        return Err(RecommendError::Internal(format!(
            "Reranker returned a non-finite score ({}) for candidate {}",
            raw[pos], candidates[pos].index
        )));
    }

    let raw: Vec<f64> = raw.into_iter().map(f64::from).collect();
    let normalized = normalize_scores(&raw);

    let mut results: Vec<Recommendation> = candidates
        .iter()
        .zip(raw.iter().zip(&normalized))
        .map(|(candidate, (&raw_score, &score))| {
            let record = corpus.record(candidate.index);
            Recommendation {
                name: record.name.clone(),
                url: record.url.clone(),
                score,
                raw_score,
                hybrid_score: f64::from(candidate.hybrid_score),
                description: truncate_description(&record.description, description_chars),
                test_type: record.test_type.clone(),
            }
        })
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score));

    tracing::debug!(
        candidates = results.len(),
        model = provider.model_name(),
        top = results.first().map(|r| r.name.as_str()).unwrap_or(""),
        "Re-ranked candidates"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::AssessmentRecord;

    struct LengthReranker;

    #[async_trait]
    impl RerankProvider for LengthReranker {
        async fn score(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
            Ok(documents.iter().map(|d| d.len() as f32).collect())
        }

        fn model_name(&self) -> &str {
            "length"
        }
    }

    struct FlatReranker;

    #[async_trait]
    impl RerankProvider for FlatReranker {
        async fn score(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
            Ok(vec![-3.5; documents.len()])
        }

        fn model_name(&self) -> &str {
            "flat"
        }
    }

    /// Returns NaN for the second document.
    struct NanReranker;

    #[async_trait]
    impl RerankProvider for NanReranker {
        async fn score(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError> {
            Ok((0..documents.len())
                .map(|i| if i == 1 { f32::NAN } else { i as f32 })
                .collect())
        }

        fn model_name(&self) -> &str {
            "nan"
        }
    }

    fn candidate(index: usize) -> Candidate {
        Candidate {
            index,
            neural_score: 0.0,
            keyword_score: 0.0,
            hybrid_score: 0.1 * index as f32,
        }
    }

    fn corpus() -> Corpus {
        Corpus::from_records(vec![
            AssessmentRecord::new("a", "u1"),
            AssessmentRecord::new("bbbbbbbb", "u2").with_description("x".repeat(250)),
            AssessmentRecord::new("ccc", "u3").with_test_types(&[TestType::Knowledge]),
        ])
    }

    #[test]
    fn test_normalize_range() {
        let out = normalize_scores(&[-2.0, 0.0, 2.0]);
        assert_eq!(out, vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn test_normalize_flat_batch() {
        assert_eq!(normalize_scores(&[1.5, 1.5]), vec![50.0, 50.0]);
        assert_eq!(normalize_scores(&[7.0]), vec![50.0]);
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_truncate_description() {
        assert_eq!(truncate_description("short", 200), "short...");
        assert_eq!(truncate_description("", 200), "...");
        let long = "é".repeat(300);
        let out = truncate_description(&long, 200);
        assert_eq!(out.chars().count(), 203);
    }

    #[tokio::test]
    async fn test_rerank_orders_by_normalized_score() {
        let corpus = corpus();
        let candidates = vec![candidate(0), candidate(2), candidate(1)];
        let results = rerank(&LengthReranker, "q", &corpus, &candidates, 200).await.unwrap();

        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bbbbbbbb", "ccc", "a"]);
        assert_eq!(results[0].score, 100.0);
        assert_eq!(results[2].score, 0.0);
        assert!(results.iter().all(|r| (0.0..=100.0).contains(&r.score)));
        assert_eq!(results[0].description.chars().count(), 203);
        assert!((results[1].hybrid_score - 0.2).abs() < 1e-6);
        assert_eq!(results[1].test_type, vec![TestType::Knowledge]);
    }

    #[tokio::test]
    async fn test_rerank_flat_scores() {
        let corpus = corpus();
        let candidates = vec![candidate(0), candidate(1)];
        let results = rerank(&FlatReranker, "q", &corpus, &candidates, 200).await.unwrap();
        assert!(results.iter().all(|r| r.score == FLAT_BATCH_SCORE));
        assert_eq!(results[0].raw_score, -3.5);
    }

    #[tokio::test]
    async fn test_rerank_rejects_non_finite_scores() {
        let corpus = corpus();
        let candidates = vec![candidate(0), candidate(1), candidate(2)];
        let result = rerank(&NanReranker, "q", &corpus, &candidates, 200).await;
        match result {
            Err(RecommendError::Internal(msg)) => assert!(msg.contains("non-finite"), "{}", msg),
            other => panic!("expected Internal error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[tokio::test]
    async fn test_rerank_empty_candidates() {
        let results = rerank(&LengthReranker, "q", &corpus(), &[], 200).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_recommendation_field_names() {
        let rec = Recommendation {
            name: "Java 8".to_string(),
            url: "u".to_string(),
            score: 100.0,
            raw_score: 4.2,
            hybrid_score: 0.5,
            description: "...".to_string(),
            test_type: vec![TestType::Knowledge],
        };
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["Assessment name"], "Java 8");
        assert_eq!(value["URL"], "u");
        assert_eq!(value["Score"], 100.0);
        assert_eq!(value["Raw Score"], 4.2);
        assert_eq!(value["Hybrid Score"], 0.5);
        assert_eq!(value["Test Type"], serde_json::json!(["K"]));
    }
}
