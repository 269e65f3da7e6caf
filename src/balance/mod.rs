/// Domain balancing of the re-ranked list.
///
/// Queries are classified by keyword as technical, interpersonal, both or neither.
/// Single-domain queries prefer assessment families matching that domain; mixed
/// queries get a knowledge/personality split. Scores are never changed, only which
/// results are kept and in what order.

use std::collections::HashSet;

use crate::corpus::TestType;
use crate::rerank::Recommendation;

pub const TECHNICAL_KEYWORDS: &[&str] = &[
    "developer", "programmer", "engineer", "python", "java", "sql",
    "coding", "technical", "software", "data", "analyst", "architect",
];

pub const SOFT_KEYWORDS: &[&str] = &[
    "communication", "collaboration", "leadership", "teamwork", "management",
    "interpersonal", "stakeholder", "personality", "behavioral", "soft skills",
];

const TECHNICAL_TYPES: &[TestType] = &[TestType::Knowledge, TestType::Cognitive, TestType::Ability];
const SOFT_TYPES: &[TestType] = &[TestType::Personality, TestType::Behavioral];

/// Which domains a query mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryIntent {
    pub technical: bool,
    pub soft: bool,
}

impl QueryIntent {
    /// Case-insensitive substring match against the keyword lists.
    pub fn detect(query: &str) -> Self {
        let q = query.to_lowercase();
        QueryIntent {
            technical: TECHNICAL_KEYWORDS.iter().any(|k| q.contains(k)),
            soft: SOFT_KEYWORDS.iter().any(|k| q.contains(k)),
        }
    }
}

/// Reshape the re-ranked `results` into at most `k` entries for `query`.
pub fn balance(query: &str, results: Vec<Recommendation>, k: usize) -> Vec<Recommendation> {
    let intent = QueryIntent::detect(query);
    tracing::debug!(technical = intent.technical, soft = intent.soft, k, "Balancing results");

    match (intent.technical, intent.soft) {
        (true, false) => prefer_types(results, TECHNICAL_TYPES, k),
        (false, true) => prefer_types(results, SOFT_TYPES, k),
        (true, true) => mixed(results, k),
        (false, false) => take(results, k),
    }
}

/// Filtered top `k` if the filter yields at least `k`, otherwise the unfiltered top `k`.
fn prefer_types(results: Vec<Recommendation>, types: &[TestType], k: usize) -> Vec<Recommendation> {
    let matching = results.iter().filter(|r| has_any(r, types)).count();
    if matching >= k {
        results.into_iter().filter(|r| has_any(r, types)).take(k).collect()
    } else {
        take(results, k)
    }
}

fn mixed(results: Vec<Recommendation>, k: usize) -> Vec<Recommendation> {
    let half = k / 2;
    let mut chosen: Vec<usize> = Vec::with_capacity(k.min(results.len()));
    let mut used: HashSet<&str> = HashSet::new();

    let knowledge = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.test_type.contains(&TestType::Knowledge))
        .take(half);
    for (i, r) in knowledge {
        if used.insert(r.url.as_str()) {
            chosen.push(i);
        }
    }

    let personality = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.test_type.contains(&TestType::Personality) && !used.contains(r.url.as_str()))
        .take(half)
        .map(|(i, r)| (i, r.url.as_str()))
        .collect::<Vec<_>>();
    for (i, url) in personality {
        if used.insert(url) {
            chosen.push(i);
        }
    }

    for (i, r) in results.iter().enumerate() {
        if chosen.len() >= k {
            break;
        }
        if used.insert(r.url.as_str()) {
            chosen.push(i);
        }
    }
    chosen.truncate(k);

    let mut slots: Vec<Option<Recommendation>> = results.into_iter().map(Some).collect();
    chosen.into_iter().filter_map(|i| slots[i].take()).collect()
}

fn take(results: Vec<Recommendation>, k: usize) -> Vec<Recommendation> {
    results.into_iter().take(k).collect()
}

fn has_any(r: &Recommendation, types: &[TestType]) -> bool {
    r.test_type.iter().any(|t| types.contains(t))
}
