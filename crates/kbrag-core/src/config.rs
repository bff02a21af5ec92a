//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nesting, e.g. `APP_RETRIEVAL__CHUNK_SIZE`).
//! The bare retrieval option names (`CHUNK_SIZE`, `SESSION_TIMEOUT`, ...) are
//! also honoured and land under `[retrieval]`.
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::DocumentField;

const RETRIEVAL_ENV_KEYS: &[&str] = &[
    "CHUNK_SIZE",
    "CHUNK_OVERLAP",
    "MAX_RETRIEVAL_RESULTS",
    "SIMILARITY_THRESHOLD",
    "MAX_CONVERSATION_HISTORY",
    "SESSION_TIMEOUT",
    "EMBEDDING_MODEL",
    "DISTANCE_METRIC",
];

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment
            .merge(
                Env::raw()
                    .only(RETRIEVAL_ENV_KEYS)
                    .map(|key| format!("retrieval.{}", key.as_str().to_ascii_lowercase()).into()),
            )
            .merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Wraps an already-built figment; defaults are merged underneath it.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed, validated `[retrieval]` table.
    pub fn retrieval(&self) -> Result<RetrievalConfig> {
        let retrieval: RetrievalConfig = self
            .figment
            .extract_inner("retrieval")
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        retrieval.validate()?;
        Ok(retrieval)
    }

    pub fn data(&self) -> Result<DataConfig> {
        self.figment.extract_inner("data").map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let retrieval = self.retrieval()?;
        if matches!(env, "prod" | "production") && retrieval.embedding_model == HASH_EMBEDDING_MODEL {
            tracing::warn!("hash embeddings configured in production; similarity will be lexical only");
        }
        Ok(())
    }
}

/// Model identifier selecting the deterministic hash embedder.
pub const HASH_EMBEDDING_MODEL: &str = "hash";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Settings {
    retrieval: RetrievalConfig,
    data: DataConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
}

/// Grouped computation an intent maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AggregateOp {
    CountAll,
    CountBy { field: DocumentField },
}

/// One entry of the aggregation intent vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRule {
    pub name: String,
    pub phrases: Vec<String>,
    pub operation: AggregateOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_retrieval_results: usize,
    pub similarity_threshold: f32,
    pub max_conversation_history: usize,
    /// Idle seconds after which a session expires.
    pub session_timeout: u64,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub model_dir: Option<String>,
    pub distance_metric: DistanceMetric,
    pub embed_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub structured_collection: String,
    pub structured_limit: usize,
    pub aggregation_keywords: Vec<String>,
    pub intents: Vec<IntentRule>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_retrieval_results: 5,
            similarity_threshold: 0.3,
            max_conversation_history: 10,
            session_timeout: 1800,
            embedding_model: "bge-m3".to_string(),
            embedding_dim: 1024,
            model_dir: None,
            distance_metric: DistanceMetric::Cosine,
            embed_timeout_ms: 10_000,
            store_timeout_ms: 5_000,
            structured_collection: "documents".to_string(),
            structured_limit: 10,
            aggregation_keywords: ["how many", "count", "number of", "total", "tally"]
                .into_iter()
                .map(String::from)
                .collect(),
            intents: default_intents(),
        }
    }
}

fn default_intents() -> Vec<IntentRule> {
    let rule = |name: &str, phrases: &[&str], operation: AggregateOp| IntentRule {
        name: name.to_string(),
        phrases: phrases.iter().map(|p| p.to_string()).collect(),
        operation,
    };
    vec![
        rule(
            "count_all",
            &[
                "count all documents",
                "count all records",
                "count documents",
                "how many documents",
                "how many documents are there",
                "how many records",
                "total documents",
                "total number of documents",
                "number of documents",
            ],
            AggregateOp::CountAll,
        ),
        rule(
            "count_by_category",
            &[
                "count by category",
                "count documents by category",
                "documents per category",
                "how many documents per category",
                "how many documents in each category",
                "number of documents per category",
            ],
            AggregateOp::CountBy { field: DocumentField::Category },
        ),
        rule(
            "count_by_source",
            &["count by source", "count documents by source", "documents per source"],
            AggregateOp::CountBy { field: DocumentField::Source },
        ),
    ]
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidConfig(format!(
                "similarity_threshold {} outside [-1, 1]",
                self.similarity_threshold
            )));
        }
        if self.max_retrieval_results == 0 {
            return Err(Error::InvalidConfig("max_retrieval_results must be positive".into()));
        }
        if self.max_conversation_history == 0 {
            return Err(Error::InvalidConfig("max_conversation_history must be positive".into()));
        }
        if self.structured_limit == 0 {
            return Err(Error::InvalidConfig("structured_limit must be positive".into()));
        }
        if self.embedding_dim == 0 {
            return Err(Error::InvalidConfig("embedding_dim must be positive".into()));
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration { Duration::from_secs(self.session_timeout) }
    pub fn embed_timeout(&self) -> Duration { Duration::from_millis(self.embed_timeout_ms) }
    pub fn store_timeout(&self) -> Duration { Duration::from_millis(self.store_timeout_ms) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub knowledge_dir: String,
    pub index_snapshot: String,
    pub store_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            knowledge_dir: "data/knowledge".to_string(),
            index_snapshot: "data/index/vectors.json".to_string(),
            store_dir: "data/index/store".to_string(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
