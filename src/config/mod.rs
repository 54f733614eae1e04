//! Configuration management for the retrieval engine
//!
//! One `Config` value is loaded at startup and threaded into every component
//! constructor. Nothing reads configuration from global state after that.

use crate::error::{CourseMateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Which embedding backend to build at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local ONNX model through fastembed
    Fastembed,
    /// OpenAI-compatible HTTP embeddings endpoint
    Openai,
    /// Deterministic hash vectors, non-production only
    Placeholder,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fastembed" => Ok(Self::Fastembed),
            "openai" => Ok(Self::Openai),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(format!(
                "unknown provider '{}', expected fastembed, openai or placeholder",
                other
            )),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    /// Name of the environment variable holding the API credential
    pub api_key_env: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

/// Index configuration (dense + lexical)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Embedding dimensionality D; every stored vector has exactly this length
    pub vector_dim: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
    pub hnsw_max_elements: usize,
    /// Tantivy writer heap budget
    pub writer_memory_bytes: usize,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Longest run of lines kept in one layout-aware chunk
    pub max_lines_per_chunk: usize,
}

/// What a hybrid query does when one backend fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Answer from the surviving backend and mark the response degraded
    FailOpen,
    /// Report the failed backend and return no results
    FailClosed,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fail_open" => Ok(Self::FailOpen),
            "fail_closed" => Ok(Self::FailClosed),
            other => Err(format!(
                "unknown failure policy '{}', expected fail_open or fail_closed",
                other
            )),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// RRF smoothing constant
    pub rrf_k: f64,
    pub dense_weight: f64,
    pub lexical_weight: f64,
    /// Each backend is asked for `k * candidate_multiplier` candidates
    pub candidate_multiplier: usize,
    pub failure_policy: FailurePolicy,
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            dense_weight: 1.0,
            lexical_weight: 1.0,
            candidate_multiplier: 1,
            failure_policy: FailurePolicy::FailOpen,
            default_k: 8,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<ProviderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_dim: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CourseMateError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CourseMateError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| CourseMateError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self.profiles.get(profile).cloned().ok_or_else(|| {
            CourseMateError::Config(format!("Unknown profile: {}", profile))
        })?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(dim) = overrides.vector_dim {
            self.indexing.vector_dim = dim;
        }
        if let Some(policy) = overrides.failure_policy {
            self.retrieval.failure_policy = policy;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: COURSEMATE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("COURSEMATE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "EMBEDDING__PROVIDER" => {
                self.embedding.provider = value.parse().map_err(|message| {
                    CourseMateError::InvalidConfigValue {
                        path: path.to_string(),
                        message,
                    }
                })?;
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__API_BASE" => {
                self.embedding.api_base = value.to_string();
            }
            "INDEXING__VECTOR_DIM" => {
                self.indexing.vector_dim = parse_value(path, value)?;
            }
            "RETRIEVAL__RRF_K" => {
                self.retrieval.rrf_k = parse_value(path, value)?;
            }
            "RETRIEVAL__CANDIDATE_MULTIPLIER" => {
                self.retrieval.candidate_multiplier = parse_value(path, value)?;
            }
            "RETRIEVAL__FAILURE_POLICY" => {
                self.retrieval.failure_policy = value.parse().map_err(|message| {
                    CourseMateError::InvalidConfigValue {
                        path: path.to_string(),
                        message,
                    }
                })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            CourseMateError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("coursemate").join("config.toml"))
    }

    /// Data directory with a leading `~` expanded
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CourseMateError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

/// Expand a leading `~` against the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or_else(|| {
                CourseMateError::Config("Cannot determine home directory".to_string())
            })?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.coursemate"),
            },
            embedding: EmbeddingConfig {
                provider: ProviderKind::Openai,
                model: "text-embedding-3-small".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                api_base: "https://api.openai.com/v1".to_string(),
                timeout_secs: 30,
            },
            indexing: IndexingConfig {
                vector_dim: 1536,
                hnsw_ef_construction: 200,
                hnsw_m: 16,
                hnsw_ef_search: 64,
                hnsw_max_elements: 100_000,
                writer_memory_bytes: 50_000_000,
            },
            chunking: ChunkingConfig {
                max_lines_per_chunk: 12,
            },
            retrieval: RetrievalConfig::default(),
            profiles: HashMap::new(),
        }
    }
}
