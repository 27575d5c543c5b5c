use std::time::Duration;
use thiserror::Error;

/// Failures at the persistence seam. Store implementations translate their
/// backend's errors into these before they cross into the pipelines.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    #[error("conversation not found: {0}")]
    ConversationNotFound(uuid::Uuid),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("failed to fetch stored file {key}: {details}")]
    FetchFailed { key: String, details: String },

    #[error("pdf extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("embedding request failed: {0}")]
    EmbeddingFailed(String),

    #[error("embedding request timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("blob storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("conversation not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("embedding request failed: {0}")]
    EmbeddingFailed(String),

    #[error("embedding request timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("generation request failed: {0}")]
    GenerationFailed(String),

    #[error("generation request timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("generation oracle violated its output contract: {0}")]
    GenerationContractViolation(String),

    #[error("invalid regeneration state: {0}")]
    InvalidRegenerationState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ChatError {
    /// Query-pipeline failures surface to the user as a fallback answer
    /// rather than a hard error; store and argument failures do not.
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(
            self,
            ChatError::EmbeddingFailed(_)
                | ChatError::EmbeddingTimeout(_)
                | ChatError::GenerationFailed(_)
                | ChatError::GenerationTimeout(_)
                | ChatError::GenerationContractViolation(_)
        )
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
