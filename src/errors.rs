/// Domain-specific error types for assessrec
///
/// Load failures, readiness failures and provider failures all surface as
/// `RecommendError` so the service layer can map them to structured tool errors.

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("Corpus unavailable at {path}: {reason}")]
    CorpusUnavailable {
        path: String,
        reason: String,
    },

    #[error("Malformed record at index {index}: {reason}")]
    MalformedRecord {
        index: usize,
        reason: String,
    },

    #[error("Recommendation engine is not ready")]
    EngineNotReady,

    #[error("Corpus contains no usable records")]
    EmptyCorpus,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::embedding::EmbeddingError> for RecommendError {
    fn from(e: crate::embedding::EmbeddingError) -> Self {
        RecommendError::Internal(e.to_string())
    }
}

impl From<crate::rerank::RerankError> for RecommendError {
    fn from(e: crate::rerank::RerankError) -> Self {
        RecommendError::Internal(e.to_string())
    }
}

impl RecommendError {
    /// Helper to create corpus load errors
    ///
    /// Example:
    /// ```
    /// use assessrec::errors::RecommendError;
    /// let err = RecommendError::corpus_unavailable("data/assessments.json", "file not found");
    /// assert!(err.to_string().contains("file not found"));
    /// ```
    pub fn corpus_unavailable(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        RecommendError::CorpusUnavailable {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}
