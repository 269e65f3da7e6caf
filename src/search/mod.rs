/// Hybrid candidate retrieval.
///
/// Combines the dense (semantic) and sparse (lexical) similarity of a query against
/// every record into one weighted score, then keeps the best `pool` records as the
/// shortlist for cross-encoder re-ranking.

/// A record index with the scores that selected it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Ordinal position in the corpus
    pub index: usize,
    pub neural_score: f32,
    pub keyword_score: f32,
    pub hybrid_score: f32,
}

/// Fixed linear blend of the two retrieval signals.
#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub semantic: f32,
    pub lexical: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        HybridWeights {
            semantic: 0.8,
            lexical: 0.2,
        }
    }
}

impl HybridWeights {
    pub fn combine(&self, semantic: f32, lexical: f32) -> f32 {
        self.semantic * semantic + self.lexical * lexical
    }
}

/// Score every record and return the top `pool` candidates, best first.
///
/// `semantic` and `lexical` are co-indexed with the corpus. Equal hybrid scores keep
/// corpus order.
pub fn hybrid_candidates(
    semantic: &[f32],
    lexical: &[f32],
    weights: HybridWeights,
    pool: usize,
) -> Vec<Candidate> {
    debug_assert_eq!(semantic.len(), lexical.len());

    let mut candidates: Vec<Candidate> = semantic
        .iter()
        .zip(lexical)
        .enumerate()
        .map(|(index, (&neural, &keyword))| Candidate {
            index,
            neural_score: neural,
            keyword_score: keyword,
            hybrid_score: weights.combine(neural, keyword),
        })
        .collect();

    // sort_by is stable, so ties stay in corpus order. Non-finite scores sink to the end.
    candidates.sort_by(|a, b| rank_key(b.hybrid_score).total_cmp(&rank_key(a.hybrid_score)));
    candidates.truncate(pool.min(semantic.len()));
    candidates
}

fn rank_key(score: f32) -> f32 {
    if score.is_finite() {
        score
    } else {
        f32::NEG_INFINITY
    }
}
