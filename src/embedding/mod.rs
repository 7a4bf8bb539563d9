pub mod deterministic;
pub mod ollama;

use crate::config::EmbeddingConfig;
use crate::error::EngramResult;
use anyhow::Result;
use async_trait::async_trait;

/// Trait for embedding text into vectors.
///
/// Implementations produce vectors of exactly the deployment's configured
/// dimension. The embedding model itself is a remote collaborator; the engine
/// only consumes its output.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> EngramResult<Vec<f32>>;

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize;
}

/// Create an embedding provider from config.
///
/// `"ollama"` talks to a remote embedding endpoint; `"static"` produces
/// deterministic vectors for tests and offline development.
pub fn create_provider(
    config: &EmbeddingConfig,
    dimensions: usize,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(ollama::OllamaEmbedding::new(config, dimensions)?)),
        "static" => Ok(Box::new(deterministic::StaticEmbedding::new(dimensions))),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: ollama, static"),
    }
}
