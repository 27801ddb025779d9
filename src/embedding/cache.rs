use super::{Embedding, EmbeddingProvider};
use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Memoizes single-text embeddings (queries) keyed by content hash.
///
/// Batch calls pass straight through: chunk texts are embedded once per
/// indexing run and would only bloat the cache.
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingProvider>,
    cache: RwLock<HashMap<String, Embedding>>,
}

impl CachedEmbedding {
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn cache_key(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for CachedEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let key = Self::cache_key(text);
        if let Some(hit) = self.cache.read().await.get(&key) {
            return Ok(hit.clone());
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.write().await.insert(key, embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Embedding {
                values: vec![text.len() as f32, 1.0],
            })
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_repeated_query_hits_cache() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedEmbedding::new(inner.clone());

        let first = cached.embed("how is auth handled").await.unwrap();
        let second = cached.embed("how is auth handled").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.embed("another question").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.len().await, 2);
        assert_eq!(cached.dimension(), 2);
    }

    #[tokio::test]
    async fn test_batches_are_not_cached() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedEmbedding::new(inner.clone());

        cached.embed_batch(&["a", "b"]).await.unwrap();
        cached.embed_batch(&["a", "b"]).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
        assert!(cached.is_empty().await);
    }

    #[test]
    fn test_cache_key_is_sha256_hex() {
        assert_eq!(
            CachedEmbedding::cache_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
