use thiserror::Error;

/// Result type for chunking, retrieval and context assembly
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core.
///
/// Skip conditions (unreadable files, unparseable sources, empty collections)
/// are not errors and never show up here.
#[derive(Error, Debug)]
pub enum Error {
    /// Retrieval was attempted before a collection was bound
    #[error("No target collection set. Call set_collection() first.")]
    NoTargetCollection,

    /// A token budget of zero was passed in
    #[error("Invalid budget for {what}: must be greater than zero")]
    InvalidBudget { what: &'static str },

    #[error("Unknown chunking strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown chunk type: {0}")]
    UnknownChunkType(String),

    /// Embedding provider or vector store failure, passed through untouched
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid_budget(what: &'static str) -> Self {
        Self::InvalidBudget { what }
    }
}
