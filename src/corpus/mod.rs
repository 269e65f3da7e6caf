/// Assessment corpus: the fixed catalogue every query is scored against.
///
/// Records are loaded once from a JSON array. Each record gets one derived text
/// (name, description, categories and test types folded into a sentence) that both
/// indexes consume; `records[i]` and `texts[i]` always describe the same assessment.
///
/// Load policy: a missing or unparsable file fails the whole load; a bad entry is
/// skipped and logged; a repeated `url` keeps the first occurrence.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::errors::RecommendError;

/// Assessment family code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestType {
    #[serde(rename = "K")]
    Knowledge,
    #[serde(rename = "P")]
    Personality,
    #[serde(rename = "C")]
    Cognitive,
    #[serde(rename = "A")]
    Ability,
    #[serde(rename = "B")]
    Behavioral,
    #[serde(rename = "S")]
    Simulation,
}

impl TestType {
    pub fn code(self) -> &'static str {
        match self {
            TestType::Knowledge => "K",
            TestType::Personality => "P",
            TestType::Cognitive => "C",
            TestType::Ability => "A",
            TestType::Behavioral => "B",
            TestType::Simulation => "S",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "K" => Ok(TestType::Knowledge),
            "P" => Ok(TestType::Personality),
            "C" => Ok(TestType::Cognitive),
            "A" => Ok(TestType::Ability),
            "B" => Ok(TestType::Behavioral),
            "S" => Ok(TestType::Simulation),
            other => Err(format!("Unknown test type code: {}", other)),
        }
    }
}

/// One catalogued assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub name: String,
    /// Canonical link, unique across the corpus
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub test_type: Vec<TestType>,
}

impl AssessmentRecord {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        AssessmentRecord {
            name: name.into(),
            url: url.into(),
            description: String::new(),
            categories: Vec::new(),
            test_type: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_test_types(mut self, types: &[TestType]) -> Self {
        self.test_type = dedup_types(types.iter().copied());
        self
    }

    /// The single string both indexes see for this record.
    pub fn derived_text(&self) -> String {
        let types: Vec<&str> = self.test_type.iter().map(|t| t.code()).collect();
        format!(
            "Assessment: {}. Description: {}. Categories: {}. Types: {}",
            self.name,
            self.description,
            self.categories.join(", "),
            types.join(", ")
        )
    }
}

/// Counts produced while loading a corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub accepted: usize,
    pub skipped_malformed: usize,
    pub skipped_duplicate: usize,
}

/// Ordered, immutable record list with co-indexed derived texts.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: Vec<AssessmentRecord>,
    texts: Vec<String>,
    report: LoadReport,
}

impl Corpus {
    /// Read a JSON array of records from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Corpus, RecommendError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RecommendError::corpus_unavailable(path, e))?;
        let corpus = Self::from_json_str(&raw)
            .map_err(|e| RecommendError::corpus_unavailable(path, e))?;

        tracing::info!(
            path = %path.display(),
            accepted = corpus.report.accepted,
            skipped_malformed = corpus.report.skipped_malformed,
            skipped_duplicate = corpus.report.skipped_duplicate,
            "Corpus loaded"
        );
        Ok(corpus)
    }

    /// Parse a JSON array of records. Only a non-array document is an error.
    pub fn from_json_str(raw: &str) -> Result<Corpus, String> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| format!("invalid JSON: {}", e))?;
        let entries = match value {
            Value::Array(entries) => entries,
            other => {
                return Err(format!(
                    "expected a JSON array of records, found {}",
                    json_kind(&other)
                ))
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        let mut skipped_malformed = 0;
        for (index, entry) in entries.iter().enumerate() {
            match parse_record(index, entry) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped_malformed += 1;
                    tracing::warn!(error = %e, "Skipping corpus entry");
                }
            }
        }

        let mut corpus = Self::from_records(records);
        corpus.report.skipped_malformed = skipped_malformed;
        Ok(corpus)
    }

    /// Build a corpus from in-memory records, dropping later duplicate urls.
    pub fn from_records(records: Vec<AssessmentRecord>) -> Corpus {
        let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
        let mut kept = Vec::with_capacity(records.len());
        let mut skipped_duplicate = 0;

        for record in records {
            if !seen.insert(record.url.clone()) {
                skipped_duplicate += 1;
                tracing::warn!(url = %record.url, "Duplicate url in corpus, keeping first occurrence");
                continue;
            }
            kept.push(record);
        }

        let texts = kept.iter().map(AssessmentRecord::derived_text).collect();
        Corpus {
            report: LoadReport {
                accepted: kept.len(),
                skipped_malformed: 0,
                skipped_duplicate,
            },
            records: kept,
            texts,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AssessmentRecord] {
        &self.records
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn record(&self, index: usize) -> &AssessmentRecord {
        &self.records[index]
    }

    pub fn text(&self, index: usize) -> &str {
        &self.texts[index]
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Number of records carrying each test type code.
    pub fn test_type_counts(&self) -> BTreeMap<TestType, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            for t in &record.test_type {
                *counts.entry(*t).or_insert(0) += 1;
            }
        }
        counts
    }
}

fn parse_record(index: usize, entry: &Value) -> Result<AssessmentRecord, RecommendError> {
    let malformed = |reason: &str| RecommendError::MalformedRecord {
        index,
        reason: reason.to_string(),
    };

    let obj = entry.as_object().ok_or_else(|| malformed("entry is not an object"))?;
    let name = required_str(obj, "name").ok_or_else(|| malformed("missing or empty 'name'"))?;
    let url = required_str(obj, "url").ok_or_else(|| malformed("missing or empty 'url'"))?;

    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let categories = string_items(obj.get("categories"))
        .map(str::to_string)
        .collect();

    let test_type = dedup_types(string_items(obj.get("test_type")).filter_map(|code| {
        match code.parse::<TestType>() {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::debug!(index, error = %e, "Dropping unknown test type");
                None
            }
        }
    }));

    Ok(AssessmentRecord {
        name,
        url,
        description,
        categories,
        test_type,
    })
}

fn required_str(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_items(value: Option<&Value>) -> impl Iterator<Item = &str> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn dedup_types(types: impl Iterator<Item = TestType>) -> Vec<TestType> {
    let mut out: Vec<TestType> = Vec::new();
    for t in types {
        if !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {"name": "Java 8 (New)", "url": "https://example.com/java-8",
         "description": "Multi-choice test of Java knowledge.",
         "categories": ["Pre-packaged", "Technology"], "test_type": ["K"]},
        {"name": "OPQ32r", "url": "https://example.com/opq",
         "test_type": ["P", "X", "P"]},
        {"url": "https://example.com/nameless"},
        {"name": "Duplicate", "url": "https://example.com/java-8"},
        "not an object",
        {"name": "Verify G+", "url": "https://example.com/verify",
         "categories": ["Ability", 7], "description": null}
    ]"#;

    #[test]
    fn test_load_skips_bad_entries_and_duplicates() {
        let corpus = Corpus::from_json_str(SAMPLE).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(
            corpus.report(),
            &LoadReport { accepted: 3, skipped_malformed: 2, skipped_duplicate: 1 }
        );
        assert_eq!(corpus.record(0).name, "Java 8 (New)");
        assert_eq!(corpus.record(1).test_type, vec![TestType::Personality]);
        assert_eq!(corpus.record(2).description, "");
        assert_eq!(corpus.record(2).categories, vec!["Ability".to_string()]);
    }

    #[test]
    fn test_texts_are_co_indexed() {
        let corpus = Corpus::from_json_str(SAMPLE).unwrap();
        assert_eq!(corpus.texts().len(), corpus.records().len());
        for (record, text) in corpus.records().iter().zip(corpus.texts()) {
            assert!(text.contains(&record.name));
        }
    }

    #[test]
    fn test_derived_text_format() {
        let record = AssessmentRecord::new("Java 8", "u")
            .with_description("Tests Java")
            .with_categories(["Technology", "Knowledge"])
            .with_test_types(&[TestType::Knowledge, TestType::Simulation]);
        assert_eq!(
            record.derived_text(),
            "Assessment: Java 8. Description: Tests Java. Categories: Technology, Knowledge. Types: K, S"
        );
    }

    #[test]
    fn test_non_array_document_is_rejected() {
        assert!(Corpus::from_json_str(r#"{"name": "x"}"#).is_err());
        assert!(Corpus::from_json_str("not json").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Corpus::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, RecommendError::CorpusUnavailable { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let corpus = Corpus::load(file.path()).unwrap();
        assert_eq!(corpus.len(), 3);
    }

    #[test]
    fn test_empty_array_is_valid() {
        let corpus = Corpus::from_json_str("[]").unwrap();
        assert!(corpus.is_empty());
        assert_eq!(corpus.report().accepted, 0);
    }

    #[test]
    fn test_type_counts() {
        let corpus = Corpus::from_records(vec![
            AssessmentRecord::new("a", "1").with_test_types(&[TestType::Knowledge, TestType::Personality]),
            AssessmentRecord::new("b", "2").with_test_types(&[TestType::Knowledge]),
        ]);
        let counts = corpus.test_type_counts();
        assert_eq!(counts.get(&TestType::Knowledge), Some(&2));
        assert_eq!(counts.get(&TestType::Personality), Some(&1));
        assert_eq!(counts.get(&TestType::Simulation), None);
    }

    #[test]
    fn test_type_serializes_as_code() {
        let json = serde_json::to_string(&vec![TestType::Knowledge, TestType::Behavioral]).unwrap();
        assert_eq!(json, r#"["K","B"]"#);
    }
}
