//! Bulk pipeline: walk a directory, chunk, embed and store

use crate::chunker::{Chunk, Chunker};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::source;
use crate::vector_db::{VectorDatabase, VectorRecord};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;

const EMBED_BATCH_SIZE: usize = 64;
const EMBED_CONCURRENCY: usize = 4;
const UPSERT_BATCH_SIZE: usize = 100;

/// Outcome of one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub files_seen: usize,
    pub files_indexed: usize,
    /// Unreadable, undecodable or empty files
    pub files_skipped: usize,
    pub chunks: usize,
}

pub struct Indexer {
    chunker: Chunker,
    embedding: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorDatabase>,
}

impl Indexer {
    pub fn new(
        chunker: Chunker,
        embedding: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorDatabase>,
    ) -> Self {
        Self {
            chunker,
            embedding,
            store,
        }
    }

    /// Chunk every code file under `root`, tagging chunks with `repo_name`.
    ///
    /// Stored `file_path`s are relative to `root`.
    pub async fn index_directory(
        &self,
        root: &Path,
        collection: &str,
        repo_name: &str,
    ) -> Result<IndexReport> {
        let files = source::list_code_files(root);
        let mut report = IndexReport {
            files_seen: files.len(),
            ..IndexReport::default()
        };
        tracing::info!("Indexing {} files under {}", files.len(), root.display());

        let config = self.chunker.config();
        let mut chunks: Vec<Chunk> = Vec::new();
        for file in &files {
            let Some(content) = source::read_text(file) else {
                tracing::warn!("Skipping unreadable file {}", file.display());
                report.files_skipped += 1;
                continue;
            };
            let relative = file.strip_prefix(root).unwrap_or(file);
            let file_chunks = self.chunker.chunk_source(
                relative,
                &content,
                config.strategy,
                config.max_chunk_tokens,
                config.overlap_tokens,
            )?;
            if file_chunks.is_empty() {
                report.files_skipped += 1;
                continue;
            }

            tracing::debug!("{}: {} chunks", relative.display(), file_chunks.len());
            let language = source::detect_language(file);
            report.files_indexed += 1;
            chunks.extend(file_chunks.into_iter().map(|mut chunk| {
                chunk.attach("repo_name", repo_name);
                chunk.attach("language", language);
                chunk
            }));
        }

        if chunks.is_empty() {
            tracing::warn!("No chunks produced under {}", root.display());
            return Ok(report);
        }

        let vectors = self.embed_chunks(&chunks).await?;

        self.store
            .create_collection(collection, self.embedding.dimension())
            .await?;
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                id: uuid::Uuid::new_v4().to_string(),
                vector,
                text: chunk.content.clone(),
                metadata: chunk.metadata(),
            })
            .collect();
        report.chunks = records.len();

        let mut batches = records.into_iter().peekable();
        while batches.peek().is_some() {
            let batch: Vec<VectorRecord> = batches.by_ref().take(UPSERT_BATCH_SIZE).collect();
            self.store.upsert(collection, batch).await?;
        }

        tracing::info!(
            "Indexed {} files ({} skipped), {} chunks into {}",
            report.files_indexed,
            report.files_skipped,
            report.chunks,
            collection
        );
        Ok(report)
    }

    /// Embeds in fixed-size batches, a few in flight at once, keeping chunk order
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(chunks.chunks(EMBED_BATCH_SIZE))
            .map(|batch| async move {
                let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
                let embeddings = self.embedding.embed_batch(&texts).await?;
                tracing::debug!("Embedded batch of {}", texts.len());
                Ok::<Vec<Vec<f32>>, anyhow::Error>(
                    embeddings.into_iter().map(|e| e.values).collect(),
                )
            })
            .buffered(EMBED_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(batches.into_iter().flatten().collect())
    }
}
