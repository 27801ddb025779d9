pub mod cache;
pub mod ollama;
pub mod openai;

use anyhow::Result;
use serde::Deserialize;

pub use cache::CachedEmbedding;
pub use ollama::OllamaEmbedding;
pub use openai::OpenAIEmbedding;

/// Embedding vector result
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

/// Embedding provider trait.
///
/// Implementations must be deterministic for identical input, and
/// `embed_batch` must preserve both order and length.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;
    fn dimension(&self) -> usize;
}
