use super::{
    sanitize_collection_name, CollectionInfo, MetadataFilter, SearchResult, VectorDatabase,
    VectorRecord,
};
use crate::chunker::Metadata;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Primary keys are uuid strings
const ID_MAX_LENGTH: usize = 64;

/// Milvus vector database client (using REST API v2)
pub struct MilvusVectorDatabase {
    client: Client,
    address: String,
}

/// Every v2 endpoint answers HTTP 200 with this envelope; `code != 0` is an error
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionRequest<'a> {
    collection_name: &'a str,
    dimension: usize,
    metric_type: &'a str,
    id_type: &'a str,
    primary_field_name: &'a str,
    vector_field_name: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct Entity<'a> {
    id: &'a str,
    vector: &'a [f32],
    text: &'a str,
    metadata: &'a Metadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    collection_name: &'a str,
    data: [&'a [f32]; 1],
    anns_field: &'a str,
    limit: usize,
    output_fields: [&'a str; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    /// For COSINE this is the similarity itself
    distance: f32,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct HasCollection {
    has: bool,
}

/// Row of a `count(*)` query; counts unflushed entities too, unlike `get_stats`
#[derive(Debug, Deserialize)]
struct CountRow {
    #[serde(rename = "count(*)")]
    count: usize,
}

impl MilvusVectorDatabase {
    pub fn new(address: &str) -> Self {
        Self {
            client: Client::new(),
            address: address.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{}", self.address, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to Milvus", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Milvus API error ({}): {}", status, body);
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Milvus {} response", path))?;
        unwrap_envelope(path, envelope)
    }
}

fn unwrap_envelope<T>(path: &str, envelope: Envelope<T>) -> Result<Option<T>> {
    if envelope.code != 0 {
        anyhow::bail!(
            "Milvus {} failed (code {}): {}",
            path,
            envelope.code,
            envelope.message.unwrap_or_default()
        );
    }
    Ok(envelope.data)
}

/// Renders exact-match conditions over the `metadata` JSON field
pub fn filter_expression(filter: &MetadataFilter) -> Option<String> {
    if filter.is_empty() {
        return None;
    }
    let clauses: Vec<String> = filter
        .iter()
        .map(|(key, value)| {
            format!(
                "metadata[\"{}\"] == \"{}\"",
                escape_literal(key),
                escape_literal(value)
            )
        })
        .collect();
    Some(clauses.join(" and "))
}

fn escape_literal(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

fn total_count(rows: Option<Vec<CountRow>>) -> usize {
    rows.unwrap_or_default().iter().map(|row| row.count).sum()
}

#[async_trait::async_trait]
impl VectorDatabase for MilvusVectorDatabase {
    async fn has_collection(&self, name: &str) -> Result<bool> {
        let name = sanitize_collection_name(name);
        let has: Option<HasCollection> = self
            .post("collections/has", &json!({ "collectionName": name }))
            .await?;
        Ok(has.map_or(false, |h| h.has))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let name = sanitize_collection_name(name);
        if self.has_collection(&name).await? {
            tracing::debug!("Collection {} already exists", name);
            return Ok(());
        }

        let request = CreateCollectionRequest {
            collection_name: &name,
            dimension,
            metric_type: "COSINE",
            id_type: "VarChar",
            primary_field_name: "id",
            vector_field_name: "vector",
            params: json!({ "max_length": ID_MAX_LENGTH }),
        };
        self.post::<_, serde_json::Value>("collections/create", &request)
            .await?;
        tracing::info!("Created collection {} (dimension {})", name, dimension);
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let data: Vec<Entity<'_>> = records
            .iter()
            .map(|record| Entity {
                id: &record.id,
                vector: &record.vector,
                text: &record.text,
                metadata: &record.metadata,
            })
            .collect();
        let request = json!({
            "collectionName": sanitize_collection_name(collection),
            "data": data,
        });

        self.post::<_, serde_json::Value>("entities/upsert", &request)
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let name = sanitize_collection_name(collection);
        let request = SearchRequest {
            collection_name: &name,
            data: [vector],
            anns_field: "vector",
            limit,
            output_fields: ["text", "metadata"],
            filter: filter.and_then(filter_expression),
        };

        let hits: Option<Vec<SearchHit>> = self.post("entities/search", &request).await?;
        Ok(hits
            .unwrap_or_default()
            .into_iter()
            .map(|hit| SearchResult {
                text: hit.text,
                metadata: hit.metadata,
                similarity: hit.distance,
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let name = sanitize_collection_name(collection);
        if !self.has_collection(&name).await? {
            return Ok(0);
        }
        let request = json!({
            "collectionName": name,
            "filter": "",
            "outputFields": ["count(*)"],
        });
        let rows: Option<Vec<CountRow>> = self.post("entities/query", &request).await?;
        Ok(total_count(rows))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let names: Option<Vec<String>> = self.post("collections/list", &json!({})).await?;
        let mut infos = Vec::new();
        for name in names.unwrap_or_default() {
            let count = self.count(&name).await?;
            infos.push(CollectionInfo { name, count });
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let name = sanitize_collection_name(name);
        self.post::<_, serde_json::Value>("collections/drop", &json!({ "collectionName": name }))
            .await?;
        tracing::info!("Dropped collection {}", name);
        Ok(())
    }
}
