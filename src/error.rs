use crate::index::Backend;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the retrieval engine
#[derive(Error, Debug)]
pub enum CourseMateError {
    /// Raw text contained no non-blank paragraph
    #[error("Input contains no non-blank text to chunk")]
    EmptyInput,

    /// A paged document produced zero chunks across all pages
    #[error("Document has no extractable text ({pages} page(s) scanned)")]
    NoExtractableText { pages: usize },

    /// The PDF could not be parsed at all
    #[error("PDF extraction failed: {0}")]
    PdfExtraction(String),

    /// Embedding provider could not be reached or returned an error
    #[error("Embedding provider '{provider}' unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    /// Embedding provider rejected the call because of rate limiting
    #[error("Embedding provider '{provider}' rate limited (retry after: {retry_after_secs:?}s)")]
    ProviderRateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Provider returned a different number of vectors than texts sent
    #[error("Embedding count mismatch: sent {expected} text(s), got {actual} vector(s)")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    /// A vector does not have the configured dimensionality
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Writing one chunk to one index failed
    #[error("{backend} index write failed for chunk {chunk_id}: {message}")]
    IndexWrite {
        backend: Backend,
        chunk_id: i64,
        message: String,
    },

    /// An index backend could not be opened or created
    #[error("{backend} index could not be opened: {message}")]
    IndexOpen { backend: Backend, message: String },

    /// One or both backends failed during a query
    #[error("Index query failed ({}): {message}", format_backends(.backends))]
    IndexQuery {
        backends: Vec<Backend>,
        message: String,
    },

    /// Query rejected before reaching any backend
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Requested document does not exist
    #[error("Document not found: {id}")]
    DocumentNotFound { id: i64 },

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_backends(backends: &[Backend]) -> String {
    backends
        .iter()
        .map(|b| b.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CourseMateError {
    /// Whether the caller may reasonably retry the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CourseMateError::ProviderUnavailable { .. }
                | CourseMateError::ProviderRateLimited { .. }
                | CourseMateError::IndexWrite { .. }
                | CourseMateError::IndexQuery { .. }
        )
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, CourseMateError>;
