//! Embedding providers
//!
//! The engine only sees the `EmbeddingProvider` trait. Which implementation
//! backs it is decided once, at startup, by `build_provider`:
//! - `OpenAiProvider` for an OpenAI-compatible HTTP endpoint
//! - `FastEmbedProvider` for a local ONNX model
//! - `PlaceholderProvider` for deterministic non-semantic vectors
mod openai;
mod placeholder;
mod provider;

pub use openai::OpenAiProvider;
pub use placeholder::PlaceholderProvider;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

use crate::config::{Config, ProviderKind};
use crate::error::{CourseMateError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Build the configured provider.
///
/// An `openai` provider without a credential in its environment variable falls
/// back to `PlaceholderProvider` with a warning, so the pipeline keeps running
/// in development setups.
pub fn build_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let dimension = config.indexing.vector_dim;

    let provider: Arc<dyn EmbeddingProvider> = match embedding.provider {
        ProviderKind::Openai => match std::env::var(&embedding.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Arc::new(
                OpenAiProvider::new(
                    &embedding.api_base,
                    key,
                    &embedding.model,
                    dimension,
                    Duration::from_secs(embedding.timeout_secs),
                )
                .map_err(|e| e.into_engine_error("openai"))?,
            ),
            _ => {
                tracing::warn!(
                    "{} is not set; using placeholder embeddings (search quality is meaningless)",
                    embedding.api_key_env
                );
                Arc::new(PlaceholderProvider::new(dimension))
            }
        },
        ProviderKind::Fastembed => Arc::new(
            FastEmbedProvider::new(&embedding.model)
                .map_err(|e| e.into_engine_error("fastembed"))?,
        ),
        ProviderKind::Placeholder => Arc::new(PlaceholderProvider::new(dimension)),
    };

    if provider.dimension() != dimension {
        return Err(CourseMateError::Config(format!(
            "Embedding model {} produces {}D vectors but indexing.vector_dim is {}",
            provider.model_name(),
            provider.dimension(),
            dimension
        )));
    }

    tracing::info!(
        "Embedding provider ready: {} ({}D)",
        provider.model_name(),
        dimension
    );

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_provider_selected() {
        let mut config = Config::default();
        config.embedding.provider = ProviderKind::Placeholder;
        config.indexing.vector_dim = 32;

        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "placeholder");
        assert_eq!(provider.dimension(), 32);
    }

    #[test]
    fn test_missing_credential_falls_back() {
        let mut config = Config::default();
        config.embedding.api_key_env = "COURSEMATE_TEST_KEY_THAT_IS_NEVER_SET".to_string();

        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "placeholder");
        assert_eq!(provider.dimension(), 1536);
    }
}
