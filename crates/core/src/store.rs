use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Chunk, Conversation, Document, DocumentStatus, Message};

/// A chunk scored against a query vector, joined with its document's name.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub document_name: String,
    pub similarity: f32,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Documents of a workspace, newest first.
    async fn list_documents(&self, workspace_id: &str) -> Result<Vec<Document>, StoreError>;

    async fn set_document_status(&self, id: Uuid, status: DocumentStatus) -> Result<(), StoreError>;

    /// Marks a document `Ready` and records its extracted page count in one
    /// step so readers never observe one without the other.
    async fn mark_document_ready(&self, id: Uuid, page_count: u32) -> Result<(), StoreError>;

    /// Deletes the document and all of its chunks atomically.
    async fn delete_document(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// Every chunk must reference a document that still exists; otherwise
    /// `DocumentNotFound`, so a delete racing an ingest cannot strand chunks.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError>;

    async fn delete_chunks_for_document(&self, document_id: Uuid) -> Result<(), StoreError>;

    async fn chunk_count(&self, document_id: Uuid) -> Result<usize, StoreError>;

    /// Nearest-neighbor scan over the workspace's chunks by cosine
    /// similarity. Only chunks of `Ready` documents are visible. Results are
    /// sorted by descending similarity; ties break on (document id, chunk
    /// index) so a fixed index state always ranks identically. A document
    /// flipping to `Ready` during a concurrent query may or may not be seen.
    async fn search_chunks(
        &self,
        workspace_id: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError>;

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// Conversations of a workspace in recency order (most recently
    /// updated first).
    async fn list_conversations(&self, workspace_id: &str) -> Result<Vec<Conversation>, StoreError>;

    async fn touch_conversation(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn append_message(&self, message: &Message) -> Result<(), StoreError>;

    /// Messages of a conversation in insertion order.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError>;

    async fn last_message(&self, conversation_id: Uuid) -> Result<Option<Message>, StoreError>;

    async fn delete_message(&self, id: Uuid) -> Result<(), StoreError>;

    /// Deletes the conversation and all of its messages.
    async fn delete_conversation(&self, id: Uuid) -> Result<(), StoreError>;
}
