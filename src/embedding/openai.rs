//! OpenAI (and OpenAI-compatible) embedding provider

use super::{Embedding, EmbeddingProvider};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Inputs accepted per request by the embeddings endpoint
const MAX_INPUTS_PER_REQUEST: usize = 2048;

/// OpenAI embedding provider
pub struct OpenAIEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: usize,
}

impl OpenAIEmbedding {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        let dimension = match model {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536,
        };

        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        }
    }

    async fn embed_request(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = OpenAIEmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, body);
        }

        let embedding_response: OpenAIEmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;
        tracing::debug!(
            "OpenAI embedded {} texts ({} tokens)",
            texts.len(),
            embedding_response.usage.total_tokens
        );

        Ok(into_ordered(embedding_response.data))
    }
}

/// The API may return items out of order; `index` is authoritative
fn into_ordered(mut data: Vec<EmbeddingData>) -> Vec<Embedding> {
    data.sort_by_key(|d| d.index);
    data.into_iter()
        .map(|d| Embedding {
            values: d.embedding,
        })
        .collect()
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let embeddings = self.embed_batch(&[text]).await?;
        embeddings
            .into_iter()
            .next()
            .context("No embedding returned")
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            let batch_embeddings = self.embed_request(batch).await?;
            if batch_embeddings.len() != batch.len() {
                anyhow::bail!(
                    "OpenAI returned {} embeddings for {} inputs",
                    batch_embeddings.len(),
                    batch.len()
                );
            }
            embeddings.extend(batch_embeddings);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_is_reordered_by_index() {
        let response: OpenAIEmbeddingResponse = serde_json::from_str(
            r#"{
                "data": [
                    {"index": 1, "embedding": [0.5, 0.5]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ],
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            }"#,
        )
        .unwrap();
        let ordered = into_ordered(response.data);
        assert_eq!(ordered[0].values, vec![1.0, 0.0]);
        assert_eq!(ordered[1].values, vec![0.5, 0.5]);
    }

    #[test]
    fn test_dimension_and_base_url() {
        let provider = OpenAIEmbedding::with_base_url("key", "text-embedding-3-large", "http://proxy/v1/");
        assert_eq!(provider.dimension(), 3072);
        assert_eq!(provider.base_url, "http://proxy/v1");
        assert_eq!(OpenAIEmbedding::new("key", "text-embedding-3-small").dimension(), 1536);
    }
}
