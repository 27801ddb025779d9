use super::{Embedding, EmbeddingProvider};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Ollama embedding provider
pub struct OllamaEmbedding {
    client: Client,
    host: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedding {
    pub fn new(host: &str, model: &str) -> Self {
        // Dimension depends on model - nomic-embed-text is 768
        let dimension = if model.contains("nomic") {
            768
        } else if model.contains("mxbai") {
            1024
        } else if model.contains("all-minilm") {
            384
        } else {
            768 // default
        };

        Self {
            client: Client::new(),
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .context("No embedding returned by Ollama")
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.host);
        let request = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }

        let embed_response: OllamaEmbedResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        if embed_response.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Ollama returned {} embeddings for {} inputs",
                embed_response.embeddings.len(),
                texts.len()
            );
        }

        tracing::debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(embed_response
            .embeddings
            .into_iter()
            .map(|values| Embedding { values })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_from_model_name() {
        assert_eq!(OllamaEmbedding::new("http://localhost:11434/", "nomic-embed-text").dimension(), 768);
        assert_eq!(OllamaEmbedding::new("http://localhost:11434", "mxbai-embed-large").dimension(), 1024);
        assert_eq!(OllamaEmbedding::new("http://localhost:11434", "all-minilm").dimension(), 384);
    }

    #[test]
    fn test_host_is_normalized() {
        let provider = OllamaEmbedding::new("http://localhost:11434/", "nomic-embed-text");
        assert_eq!(provider.host, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        // Unroutable host: any request would fail
        let provider = OllamaEmbedding::new("http://127.0.0.1:9", "nomic-embed-text");
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }
}
