//! Environment-driven configuration
//!
//! Every setting has a default; `.env` loading happens in the binary before
//! [`Config::from_env`] is called.

use crate::chunker::{ChunkStrategy, ChunkingConfig};
use crate::retriever::RetrievalConfig;
use std::str::FromStr;

const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Ollama,
    OpenAI,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    pub model: String,
    pub ollama_host: String,
    pub openai_api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Ollama,
            model: "nomic-embed-text".to_string(),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            openai_api_key: None,
        }
    }
}

/// Answer generation settings
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub model: String,
    pub host: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5:3b".to_string(),
            host: DEFAULT_OLLAMA_HOST.to_string(),
            temperature: 0.1,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub milvus_address: String,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            milvus_address: "http://127.0.0.1:19530".to_string(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(provider) = get("EMBEDDING_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "ollama" => config.embedding.provider = EmbeddingBackend::Ollama,
                "openai" => config.embedding.provider = EmbeddingBackend::OpenAI,
                other => tracing::warn!("Unknown EMBEDDING_PROVIDER {:?}, using ollama", other),
            }
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(host) = get("OLLAMA_HOST") {
            config.embedding.ollama_host = host.clone();
            config.llm.host = host;
        }
        config.embedding.openai_api_key = get("OPENAI_API_KEY");
        if let Some(address) = get("MILVUS_ADDRESS") {
            config.milvus_address = address;
        }

        if let Some(strategy) = get("CHUNK_STRATEGY") {
            match ChunkStrategy::from_str(&strategy) {
                Ok(strategy) => config.chunking.strategy = strategy,
                Err(e) => tracing::warn!("{}, using {}", e, config.chunking.strategy),
            }
        }
        parse_into(&get, "MAX_CHUNK_TOKENS", &mut config.chunking.max_chunk_tokens);
        parse_into(&get, "CHUNK_OVERLAP_TOKENS", &mut config.chunking.overlap_tokens);

        parse_into(&get, "RETRIEVAL_TOP_K", &mut config.retrieval.top_k);
        parse_into(&get, "SIMILARITY_THRESHOLD", &mut config.retrieval.similarity_threshold);
        parse_into(&get, "MAX_CONTEXT_TOKENS", &mut config.retrieval.max_context_tokens);

        if let Some(model) = get("LLM_MODEL") {
            config.llm.model = model;
        }
        parse_into(&get, "LLM_TEMPERATURE", &mut config.llm.temperature);
        parse_into(&get, "LLM_MAX_TOKENS", &mut config.llm.max_tokens);

        config
    }
}

fn parse_into<T, G>(get: &G, key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!("Invalid {}={:?}, using default {}", key, raw, slot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.chunking.strategy, ChunkStrategy::Function);
        assert_eq!(config.chunking.max_chunk_tokens, 1000);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.max_context_tokens, 4000);
        assert_eq!(config.embedding.provider, EmbeddingBackend::Ollama);
        assert_eq!(config.llm.model, "qwen2.5:3b");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("EMBEDDING_PROVIDER", "OpenAI"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OLLAMA_HOST", "http://gpu-box:11434"),
            ("CHUNK_STRATEGY", "sliding"),
            ("MAX_CHUNK_TOKENS", "512"),
            ("SIMILARITY_THRESHOLD", "0.35"),
            ("LLM_MAX_TOKENS", "800"),
        ]);
        assert_eq!(config.embedding.provider, EmbeddingBackend::OpenAI);
        assert_eq!(config.embedding.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.host, "http://gpu-box:11434");
        assert_eq!(config.chunking.strategy, ChunkStrategy::Sliding);
        assert_eq!(config.chunking.max_chunk_tokens, 512);
        assert!((config.retrieval.similarity_threshold - 0.35).abs() < 1e-6);
        assert_eq!(config.llm.max_tokens, 800);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = config_from(&[
            ("MAX_CHUNK_TOKENS", "lots"),
            ("RETRIEVAL_TOP_K", "-3"),
            ("CHUNK_STRATEGY", "paragraph"),
            ("EMBEDDING_PROVIDER", "bert"),
            ("OPENAI_API_KEY", "  "),
        ]);
        assert_eq!(config.chunking.max_chunk_tokens, 1000);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.chunking.strategy, ChunkStrategy::Function);
        assert_eq!(config.embedding.provider, EmbeddingBackend::Ollama);
        assert_eq!(config.embedding.openai_api_key, None);
    }
}
