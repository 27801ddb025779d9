pub mod memory;
pub mod milvus;

use crate::chunker::Metadata;
use anyhow::Result;

pub use memory::InMemoryVectorDatabase;
pub use milvus::MilvusVectorDatabase;

/// Exact-match metadata conditions, all of which must hold
pub type MetadataFilter = Metadata;

/// One stored entry
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// Search result from vector database
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub text: String,
    pub metadata: Metadata,
    /// Higher is more relevant
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub count: usize,
}

/// Vector database trait
#[async_trait::async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Create the collection unless it already exists
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;
    async fn has_collection(&self, name: &str) -> Result<bool>;
    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;
    /// Up to `limit` nearest entries, best similarity first
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>>;
    /// Stored entries; may trail very recent writes on remote stores
    async fn count(&self, collection: &str) -> Result<usize>;
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;
    async fn drop_collection(&self, name: &str) -> Result<()>;
}

/// Collection names keep ASCII letters, digits and `_`; everything else
/// becomes `_`. Names are padded to at least 3 and cut to 63 characters.
pub fn sanitize_collection_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.len() < 3 {
        sanitized.push_str("_col");
    }
    sanitized.truncate(63);
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collection_name() {
        assert_eq!(sanitize_collection_name("my-repo.v2"), "my_repo_v2");
        assert_eq!(sanitize_collection_name("ab"), "ab_col");
        assert_eq!(sanitize_collection_name(&"x".repeat(100)).len(), 63);
        assert_eq!(sanitize_collection_name("already_fine"), "already_fine");
    }
}
