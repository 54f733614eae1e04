use crate::config::{Config, ProviderKind, SCHEMA_VERSION};
use crate::error::{CourseMateError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CourseMateError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.provider == ProviderKind::Openai {
            if config.embedding.api_key_env.is_empty() {
                errors.push(ValidationError::new(
                    "embedding.api_key_env",
                    "API key variable name cannot be empty for the openai provider",
                ));
            }
            if !config.embedding.api_base.starts_with("http://")
                && !config.embedding.api_base.starts_with("https://")
            {
                errors.push(ValidationError::new(
                    "embedding.api_base",
                    format!("API base must be an http(s) URL, got '{}'", config.embedding.api_base),
                ));
            }
        }

        if config.embedding.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.vector_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        // tantivy refuses writer budgets below 15MB
        if config.indexing.writer_memory_bytes < 15_000_000 {
            errors.push(ValidationError::new(
                "indexing.writer_memory_bytes",
                "Writer memory must be at least 15000000 bytes",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.chunking.max_lines_per_chunk == 0 {
            errors.push(ValidationError::new(
                "chunking.max_lines_per_chunk",
                "Max lines per chunk must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if !(retrieval.rrf_k.is_finite() && retrieval.rrf_k >= 0.0) {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must be a non-negative number, got {}", retrieval.rrf_k),
            ));
        }

        if retrieval.dense_weight <= 0.0 || retrieval.lexical_weight <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.dense_weight",
                "Fusion weights must be positive",
            ));
        }

        if retrieval.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.candidate_multiplier",
                "Candidate multiplier must be greater than 0",
            ));
        }

        if retrieval.default_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_k",
                "Default k must be greater than 0",
            ));
        }
    }
}
