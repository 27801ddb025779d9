//! Query-time retrieval: embed, nearest-neighbour search, similarity floor, truncation.

use crate::chunker::Metadata;
use crate::context::build_context;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::vector_db::{sanitize_collection_name, MetadataFilter, SearchResult, VectorDatabase};
use std::sync::Arc;

/// Retrieval defaults used by [`Retriever::search_and_build`]
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// 0.0 disables the floor
    pub similarity_threshold: f32,
    pub max_context_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.0,
            max_context_tokens: 4000,
        }
    }
}

/// One ranked chunk returned for a query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub content: String,
    pub metadata: Metadata,
    /// Higher is more relevant
    pub similarity: f32,
}

impl RetrievalResult {
    fn field(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn file_path(&self) -> Option<&str> {
        self.field("file_path")
    }

    pub fn chunk_type(&self) -> Option<&str> {
        self.field("chunk_type")
    }

    pub fn name(&self) -> Option<&str> {
        self.field("name").filter(|name| !name.is_empty())
    }

    pub fn line_start(&self) -> Option<&str> {
        self.field("line_start")
    }

    pub fn line_end(&self) -> Option<&str> {
        self.field("line_end")
    }

    /// `start-end`, with `?` for a missing bound
    pub fn line_span(&self) -> String {
        format!(
            "{}-{}",
            self.line_start().unwrap_or("?"),
            self.line_end().unwrap_or("?")
        )
    }
}

impl From<SearchResult> for RetrievalResult {
    fn from(hit: SearchResult) -> Self {
        Self {
            content: hit.text,
            metadata: hit.metadata,
            similarity: hit.similarity,
        }
    }
}

/// Retrieves ranked chunks from one bound collection
pub struct Retriever {
    embedding: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorDatabase>,
    config: RetrievalConfig,
    collection: Option<String>,
}

impl Retriever {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorDatabase>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedding,
            store,
            config,
            collection: None,
        }
    }

    pub fn with_collection(mut self, name: &str) -> Self {
        self.set_collection(name);
        self
    }

    /// Bind the collection queried by later calls
    pub fn set_collection(&mut self, name: &str) {
        self.collection = Some(sanitize_collection_name(name));
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Up to `top_k` results at or above `similarity_threshold`, in store order.
    ///
    /// Twice `top_k` candidates are requested so the threshold has room to
    /// discard some without starving the result list.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&MetadataFilter>,
        similarity_threshold: f32,
    ) -> Result<Vec<RetrievalResult>> {
        let collection = self.collection.as_deref().ok_or(Error::NoTargetCollection)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        // Row counts may lag unflushed writes, so an empty collection is
        // detected by the search itself
        let query_embedding = self.embedding.embed(query).await?;
        let candidates = self
            .store
            .query(collection, &query_embedding.values, top_k * 2, filters)
            .await?;
        let candidate_count = candidates.len();
        if candidate_count == 0 {
            tracing::warn!("No candidates in collection {}", collection);
        }

        let mut results: Vec<RetrievalResult> = candidates
            .into_iter()
            .filter(|hit| similarity_threshold <= 0.0 || hit.similarity >= similarity_threshold)
            .map(RetrievalResult::from)
            .collect();
        results.truncate(top_k);

        tracing::info!(
            "Retrieved {} of {} candidates from {} (threshold {:.2})",
            results.len(),
            candidate_count,
            collection,
            similarity_threshold
        );
        Ok(results)
    }

    /// Retrieve with the configured defaults and pack the results into a context block
    pub async fn search_and_build(&self, query: &str) -> Result<(Vec<RetrievalResult>, String)> {
        let results = self
            .retrieve(
                query,
                self.config.top_k,
                None,
                self.config.similarity_threshold,
            )
            .await?;
        let context = build_context(&results, self.config.max_context_tokens, true)?;
        Ok((results, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;
    use crate::vector_db::{CollectionInfo, VectorRecord};
    use std::sync::Mutex;

    struct FixedEmbedding;

    #[async_trait::async_trait]
    impl EmbeddingProvider for FixedEmbedding {
        async fn embed(&self, _text: &str) -> anyhow::Result<Embedding> {
            Ok(Embedding {
                values: vec![1.0, 0.0],
            })
        }

        async fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Embedding>> {
            Ok(texts
                .iter()
                .map(|_| Embedding {
                    values: vec![1.0, 0.0],
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    /// Returns canned hits and records what it was asked for
    struct StubStore {
        hits: Vec<SearchResult>,
        requested: Mutex<Vec<(String, usize)>>,
        /// Row count reported by `count`, like stats that trail unflushed writes
        reported_count: Option<usize>,
    }

    impl StubStore {
        fn with_scores(scores: &[f32]) -> Self {
            let hits = scores
                .iter()
                .enumerate()
                .map(|(i, score)| {
                    let mut metadata = Metadata::new();
                    metadata.insert("file_path".to_string(), format!("file{}.py", i));
                    SearchResult {
                        text: format!("chunk {}", i),
                        metadata,
                        similarity: *score,
                    }
                })
                .collect();
            Self {
                hits,
                requested: Mutex::new(Vec::new()),
                reported_count: None,
            }
        }

        fn with_lagging_count(mut self, count: usize) -> Self {
            self.reported_count = Some(count);
            self
        }
    }

    #[async_trait::async_trait]
    impl VectorDatabase for StubStore {
        async fn create_collection(&self, _name: &str, _dimension: usize) -> anyhow::Result<()> {
            Ok(())
        }

        async fn upsert(&self, _collection: &str, _records: Vec<VectorRecord>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            collection: &str,
            _vector: &[f32],
            limit: usize,
            _filter: Option<&MetadataFilter>,
        ) -> anyhow::Result<Vec<SearchResult>> {
            self.requested
                .lock()
                .unwrap()
                .push((collection.to_string(), limit));
            Ok(self.hits.iter().take(limit).cloned().collect())
        }

        async fn has_collection(&self, _name: &str) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn count(&self, _collection: &str) -> anyhow::Result<usize> {
            Ok(self.reported_count.unwrap_or(self.hits.len()))
        }

        async fn list_collections(&self) -> anyhow::Result<Vec<CollectionInfo>> {
            Ok(Vec::new())
        }

        async fn drop_collection(&self, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn retriever(store: Arc<StubStore>) -> Retriever {
        Retriever::new(Arc::new(FixedEmbedding), store, RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_requires_collection() {
        let store = Arc::new(StubStore::with_scores(&[0.9]));
        let err = retriever(store).retrieve("q", 3, None, 0.0).await.unwrap_err();
        assert!(matches!(err, Error::NoTargetCollection));
    }

    #[tokio::test]
    async fn test_requests_twice_top_k_and_truncates() {
        let store = Arc::new(StubStore::with_scores(&[0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3]));
        let retriever = retriever(store.clone()).with_collection("my-repo");

        let results = retriever.retrieve("q", 3, None, 0.0).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            store.requested.lock().unwrap().as_slice(),
            &[("my_repo".to_string(), 6)]
        );
        let contents: Vec<_> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["chunk 0", "chunk 1", "chunk 2"]);
    }

    #[tokio::test]
    async fn test_threshold_drops_low_scores_and_keeps_order() {
        // Store order is authoritative even when not sorted
        let store = Arc::new(StubStore::with_scores(&[0.6, 0.9, 0.2, 0.7]));
        let retriever = retriever(store).with_collection("repo");

        let results = retriever.retrieve("q", 5, None, 0.5).await.unwrap();
        let scores: Vec<f32> = results.iter().map(|r| r.similarity).collect();
        assert_eq!(scores, vec![0.6, 0.9, 0.7]);
        assert!(results.iter().all(|r| r.similarity >= 0.5));
    }

    #[tokio::test]
    async fn test_empty_collection_and_zero_top_k() {
        let empty = Arc::new(StubStore::with_scores(&[]));
        let on_empty = retriever(empty.clone()).with_collection("repo");
        assert!(on_empty.retrieve("q", 5, None, 0.0).await.unwrap().is_empty());
        assert_eq!(
            empty.requested.lock().unwrap().as_slice(),
            &[("repo".to_string(), 10)]
        );

        let store = Arc::new(StubStore::with_scores(&[0.9]));
        let zero_k = retriever(store.clone()).with_collection("repo");
        assert!(zero_k.retrieve("q", 0, None, 0.0).await.unwrap().is_empty());
        assert!(store.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_row_count_does_not_hide_hits() {
        let store = Arc::new(StubStore::with_scores(&[0.9, 0.8]).with_lagging_count(0));
        assert_eq!(store.count("repo").await.unwrap(), 0);

        let retriever = retriever(store.clone()).with_collection("repo");
        let results = retriever.retrieve("q", 5, None, 0.0).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "chunk 0");
        assert_eq!(store.requested.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_line_span() {
        let mut metadata = Metadata::new();
        metadata.insert("line_start".to_string(), "12".to_string());
        let mut result = RetrievalResult {
            content: String::new(),
            metadata,
            similarity: 0.5,
        };
        assert_eq!(result.line_span(), "12-?");
        result.metadata.insert("line_end".to_string(), "30".to_string());
        assert_eq!(result.line_span(), "12-30");
    }

    #[tokio::test]
    async fn test_bound_collection_is_sanitized() {
        let store = Arc::new(StubStore::with_scores(&[]));
        let mut retriever = retriever(store);
        assert_eq!(retriever.collection(), None);
        retriever.set_collection("my-repo.v2");
        assert_eq!(retriever.collection(), Some("my_repo_v2"));
    }

    #[tokio::test]
    async fn test_search_and_build_uses_defaults() {
        let store = Arc::new(StubStore::with_scores(&[0.9, 0.8]));
        let retriever = retriever(store).with_collection("repo");

        let (results, context) = retriever.search_and_build("q").await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(context.starts_with("### [1] file0.py"));
        assert!(context.contains("### [2] file1.py"));
        assert_eq!(results[0].file_path(), Some("file0.py"));
        assert_eq!(results[0].name(), None);
    }
}
