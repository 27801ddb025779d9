//! Structure-aware code chunking and retrieval.
//!
//! Source files are cut into token-bounded chunks along syntactic units,
//! embedded, stored, and later retrieved for a question and packed into a
//! bounded context block.

pub mod chunker;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod indexer;
pub mod parser;
pub mod retriever;
pub mod source;
pub mod tokenizer;
pub mod vector_db;

pub use chunker::{Chunk, ChunkStrategy, ChunkType, Chunker, ChunkingConfig, Metadata};
pub use config::Config;
pub use context::{assemble, build_context, AssembledContext};
pub use error::{Error, Result};
pub use indexer::{IndexReport, Indexer};
pub use retriever::{RetrievalConfig, RetrievalResult, Retriever};
pub use tokenizer::count_tokens;
