/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: assessrec.toml (in working directory)
/// 3. Environment variables: prefixed ASSESSREC_ (e.g., ASSESSREC_LOG_LEVEL=debug)
///    Nested keys use a double underscore: ASSESSREC_RETRIEVAL__CANDIDATE_POOL=100

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use crate::errors::RecommendError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    /// JSON file holding the assessment catalogue.
    #[serde(default = "default_corpus_path")]
    pub corpus_path: String,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub reranker: RerankerConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Dense embedding backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (fastembed, default) or "openai"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Local model name, see `embedding::local::SUPPORTED_MODELS`
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Directory where fastembed caches downloaded weights
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Texts per embedding call when indexing the corpus
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Cross-encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_model")]
    pub model: String,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

/// Scoring constants for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,

    /// Number of hybrid candidates handed to the re-ranker
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,

    /// TF-IDF vocabulary cap
    #[serde(default = "default_max_features")]
    pub max_features: usize,

    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Characters of description kept in results before the ellipsis
    #[serde(default = "default_description_chars")]
    pub description_chars: usize,

    /// When false, building an engine over zero records fails with EmptyCorpus
    #[serde(default = "default_allow_empty_corpus")]
    pub allow_empty_corpus: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_corpus_path() -> String {
    "data/assessments.json".to_string()
}

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_cache_dir() -> String {
    ".fastembed_cache".to_string()
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_reranker_model() -> String {
    "bge-reranker-base".to_string()
}

fn default_semantic_weight() -> f32 {
    0.8
}

fn default_lexical_weight() -> f32 {
    0.2
}

fn default_candidate_pool() -> usize {
    50
}

fn default_max_features() -> usize {
    5000
}

fn default_k() -> usize {
    10
}

fn default_description_chars() -> usize {
    200
}

fn default_allow_empty_corpus() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            cache_dir: default_cache_dir(),
            openai_api_key: None,
            openai_model: default_openai_model(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        RerankerConfig {
            model: default_reranker_model(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
            candidate_pool: default_candidate_pool(),
            max_features: default_max_features(),
            default_k: default_k(),
            description_chars: default_description_chars(),
            allow_empty_corpus: default_allow_empty_corpus(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            corpus_path: default_corpus_path(),
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: ASSESSREC_LOG_LEVEL=debug overrides log_level in assessrec.toml
    pub fn load() -> Result<Config, RecommendError> {
        Self::figment("assessrec.toml")
            .extract()
            .map_err(|e| RecommendError::Config(format!("Failed to load config: {}", e)))
    }

    /// Reject settings the engine cannot run with.
    ///
    /// Called once at startup, after `load`; a failure stops the process.
    pub fn validate(&self) -> Result<(), RecommendError> {
        let r = &self.retrieval;
        for (name, weight) in [
            ("retrieval.semantic_weight", r.semantic_weight),
            ("retrieval.lexical_weight", r.lexical_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RecommendError::Config(format!(
                    "{} must be a finite, non-negative number (got {})",
                    name, weight
                )));
            }
        }
        if r.semantic_weight == 0.0 && r.lexical_weight == 0.0 {
            return Err(RecommendError::Config(
                "retrieval.semantic_weight and retrieval.lexical_weight cannot both be 0".to_string(),
            ));
        }
        if r.candidate_pool == 0 {
            return Err(RecommendError::Config(
                "retrieval.candidate_pool must be at least 1".to_string(),
            ));
        }
        match self.embedding.provider.as_str() {
            "local" | "openai" => Ok(()),
            other => Err(RecommendError::Config(format!(
                "Unknown embedding.provider '{}', expected 'local' or 'openai'",
                other
            ))),
        }
    }

    fn figment(toml_path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("ASSESSREC_").split("__"))
    }
}
