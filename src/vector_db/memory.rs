use super::{
    sanitize_collection_name, CollectionInfo, MetadataFilter, SearchResult, VectorDatabase,
    VectorRecord,
};
use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local vector store using cosine similarity.
///
/// Records keep insertion order, so equal scores rank by insertion.
#[derive(Default)]
pub struct InMemoryVectorDatabase {
    collections: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl InMemoryVectorDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn matches_filter(record: &VectorRecord, filter: Option<&MetadataFilter>) -> bool {
    filter.map_or(true, |filter| {
        filter
            .iter()
            .all(|(key, value)| record.metadata.get(key) == Some(value))
    })
}

#[async_trait::async_trait]
impl VectorDatabase for InMemoryVectorDatabase {
    async fn create_collection(&self, name: &str, _dimension: usize) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(sanitize_collection_name(name))
            .or_default();
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self
            .collections
            .read()
            .await
            .contains_key(&sanitize_collection_name(name)))
    }

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .entry(sanitize_collection_name(collection))
            .or_default();
        for record in records {
            match stored.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let Some(stored) = collections.get(&sanitize_collection_name(collection)) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<SearchResult> = stored
            .iter()
            .filter(|record| matches_filter(record, filter))
            .map(|record| SearchResult {
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                similarity: cosine_similarity(vector, &record.vector),
            })
            .collect();

        // Stable sort keeps insertion order among ties
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .collections
            .read()
            .await
            .get(&sanitize_collection_name(collection))
            .map_or(0, Vec::len))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read().await;
        let mut infos: Vec<CollectionInfo> = collections
            .iter()
            .map(|(name, records)| CollectionInfo {
                name: name.clone(),
                count: records.len(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .await
            .remove(&sanitize_collection_name(name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Metadata;

    fn record(id: &str, vector: Vec<f32>, language: &str) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("language".to_string(), language.to_string());
        VectorRecord {
            id: id.to_string(),
            vector,
            text: format!("text {}", id),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let db = InMemoryVectorDatabase::new();
        db.create_collection("repo", 2).await.unwrap();
        db.upsert(
            "repo",
            vec![
                record("far", vec![0.0, 1.0], "python"),
                record("near", vec![1.0, 0.1], "python"),
                record("mid", vec![1.0, 1.0], "rust"),
            ],
        )
        .await
        .unwrap();

        let results = db.query("repo", &[1.0, 0.0], 10, None).await.unwrap();
        let texts: Vec<_> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["text near", "text mid", "text far"]);
        assert!(results[0].similarity > 0.99);
        assert!(results[2].similarity.abs() < 1e-6);
        let diagonal = std::f32::consts::FRAC_1_SQRT_2;
        assert!((results[1].similarity - diagonal).abs() < 1e-6);

        let opposite = db.query("repo", &[-1.0, 0.0], 10, None).await.unwrap();
        assert!((opposite.last().unwrap().similarity + 0.995).abs() < 1e-3);

        let limited = db.query("repo", &[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_query_applies_filter() {
        let db = InMemoryVectorDatabase::new();
        db.upsert(
            "repo",
            vec![
                record("a", vec![1.0, 0.0], "python"),
                record("b", vec![1.0, 0.0], "rust"),
            ],
        )
        .await
        .unwrap();

        let mut filter = MetadataFilter::new();
        filter.insert("language".to_string(), "rust".to_string());
        let results = db.query("repo", &[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "text b");
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id_and_collections_are_managed() {
        let db = InMemoryVectorDatabase::new();
        db.upsert("repo", vec![record("a", vec![1.0], "python")]).await.unwrap();
        db.upsert("repo", vec![record("a", vec![2.0], "python")]).await.unwrap();
        assert_eq!(db.count("repo").await.unwrap(), 1);
        assert_eq!(db.count("missing").await.unwrap(), 0);

        assert!(db.has_collection("repo").await.unwrap());
        assert!(!db.has_collection("missing").await.unwrap());

        db.create_collection("other", 1).await.unwrap();
        assert!(db.has_collection("other").await.unwrap());
        let names: Vec<_> = db
            .list_collections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| (c.name, c.count))
            .collect();
        assert_eq!(names, vec![("other".to_string(), 0), ("repo".to_string(), 1)]);

        db.drop_collection("repo").await.unwrap();
        assert_eq!(db.count("repo").await.unwrap(), 0);
        assert!(!db.has_collection("repo").await.unwrap());
        assert!(db.query("repo", &[1.0], 5, None).await.unwrap().is_empty());
    }
}
