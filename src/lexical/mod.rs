/// Sparse TF-IDF index over derived texts.
///
/// Terms are lowercase unigrams and adjacent bigrams of `\b\w\w+\b` tokens after
/// English stopword removal. The vocabulary is fitted once on the whole corpus and
/// capped by corpus-wide frequency. Rows are L2-normalized, so cosine similarity
/// reduces to a sparse dot product.

mod stopwords;

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::errors::RecommendError;

pub use stopwords::ENGLISH_STOP_WORDS;

const TOKEN_PATTERN: &str = r"\b\w\w+\b";

/// Sparse vector: (term id, weight) pairs sorted by term id.
pub type SparseVector = Vec<(u32, f32)>;

fn stopword_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| ENGLISH_STOP_WORDS.iter().copied().collect())
}

/// Fitted TF-IDF model plus one weighted row per document.
#[derive(Debug, Clone)]
pub struct TfidfIndex {
    token_re: Regex,
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
    rows: Vec<SparseVector>,
}

impl TfidfIndex {
    /// Fit vocabulary and idf weights on `texts` and transform every text.
    pub fn build<S: AsRef<str>>(texts: &[S], max_features: usize) -> Result<Self, RecommendError> {
        let token_re = Regex::new(TOKEN_PATTERN)
            .map_err(|e| RecommendError::Internal(format!("Invalid token pattern: {}", e)))?;

        let analyzed: Vec<Vec<String>> = texts
            .iter()
            .map(|t| analyze(&token_re, t.as_ref()))
            .collect();

        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for terms in &analyzed {
            let mut seen: HashSet<&str> = HashSet::new();
            for term in terms {
                *term_freq.entry(term.as_str()).or_insert(0) += 1;
                if seen.insert(term.as_str()) {
                    *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        // Highest corpus frequency first, alphabetical among equals.
        let mut ranked: Vec<(&str, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);

        let mut kept: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();

        let n_docs = texts.len() as f32;
        let mut vocabulary = HashMap::with_capacity(kept.len());
        let mut idf = Vec::with_capacity(kept.len());
        for (id, term) in kept.iter().enumerate() {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
            idf.push(((1.0 + n_docs) / (1.0 + df)).ln() + 1.0);
            vocabulary.insert((*term).to_string(), id as u32);
        }

        let mut index = TfidfIndex {
            token_re,
            vocabulary,
            idf,
            rows: Vec::new(),
        };
        index.rows = analyzed.iter().map(|terms| index.weigh(terms)).collect();

        tracing::debug!(
            documents = index.rows.len(),
            vocabulary = index.vocabulary.len(),
            "TF-IDF index built"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    #[cfg(test)]
    fn contains_term(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }

    /// Project a query into the fitted space. Unknown terms are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        self.weigh(&analyze(&self.token_re, text))
    }

    /// Cosine similarity of `query` against every document, in corpus order.
    pub fn score(&self, query: &str) -> Vec<f32> {
        let q: HashMap<u32, f32> = self.transform(query).into_iter().collect();
        if q.is_empty() {
            return vec![0.0; self.rows.len()];
        }
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|(id, w)| q.get(id).map(|qw| qw * w))
                    .sum()
            })
            .collect()
    }

    fn weigh(&self, terms: &[String]) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for term in terms {
            if let Some(&id) = self.vocabulary.get(term) {
                *counts.entry(id).or_insert(0.0) += 1.0;
            }
        }

        let mut row: SparseVector = counts
            .into_iter()
            .map(|(id, tf)| (id, tf * self.idf[id as usize]))
            .collect();
        row.sort_unstable_by_key(|(id, _)| *id);

        let norm = row.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for (_, w) in row.iter_mut() {
                *w /= norm;
            }
        }
        row
    }
}

/// Lowercase, tokenize, drop stopwords, emit unigrams followed by bigrams.
fn analyze(token_re: &Regex, text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let stop = stopword_set();
    let tokens: Vec<&str> = token_re
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| !stop.contains(t))
        .collect();

    let mut terms: Vec<String> = tokens.iter().map(|t| (*t).to_string()).collect();
    terms.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "Java developer knowledge test",
            "Personality questionnaire for leadership and teamwork",
            "Python programming and data analysis",
            "Java programming for senior developers",
        ]
    }

    #[test]
    fn test_analyze_drops_stopwords_and_short_tokens() {
        let re = Regex::new(TOKEN_PATTERN).unwrap();
        let terms = analyze(&re, "The Java and a C developer");
        assert_eq!(terms, vec!["java", "developer", "java developer"]);
    }

    #[test]
    fn test_score_prefers_overlapping_documents() {
        let index = TfidfIndex::build(&corpus(), 5000).unwrap();
        let scores = index.score("java developer");
        assert_eq!(scores.len(), 4);
        assert!(scores[0] > scores[3], "bigram match should win: {:?}", scores);
        assert!(scores[3] > 0.0);
        assert_eq!(scores[1], 0.0);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn test_identical_text_has_unit_similarity() {
        let index = TfidfIndex::build(&corpus(), 5000).unwrap();
        let scores = index.score(corpus()[2]);
        assert!((scores[2] - 1.0).abs() < 1e-5, "{:?}", scores);
    }

    #[test]
    fn test_unknown_terms_score_zero() {
        let index = TfidfIndex::build(&corpus(), 5000).unwrap();
        assert!(index.score("kubernetes helm").iter().all(|s| *s == 0.0));
        assert!(index.score("").iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_vocabulary_cap_keeps_most_frequent() {
        let index = TfidfIndex::build(&corpus(), 2).unwrap();
        assert_eq!(index.vocabulary_size(), 2);
        // "java" and "programming" each appear twice; every other term once.
        assert!(index.contains_term("java"));
        assert!(index.contains_term("programming"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = TfidfIndex::build(&corpus(), 5000).unwrap();
        let b = TfidfIndex::build(&corpus(), 5000).unwrap();
        assert_eq!(a.score("data programming"), b.score("data programming"));
    }

    #[test]
    fn test_empty_corpus() {
        let texts: Vec<String> = Vec::new();
        let index = TfidfIndex::build(&texts, 5000).unwrap();
        assert!(index.is_empty());
        assert!(index.score("java").is_empty());
    }
}
