use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a document inside a workspace. Only the ingestion
/// pipeline moves a document out of `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub workspace_id: String,
    pub name: String,
    pub storage_key: String,
    pub page_count: Option<u32>,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(workspace_id: impl Into<String>, name: impl Into<String>, storage_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id: workspace_id.into(),
            name: name.into(),
            storage_key: storage_key.into(),
            page_count: None,
            status: DocumentStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// A bounded, overlapping segment of a document page, embedded and
/// searchable. Never mutated after insertion; deleted with its document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub workspace_id: String,
    pub page_number: u32,
    pub chunk_index: u64,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub workspace_id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    /// Citations substantiating an assistant turn. Always empty for user turns.
    pub sources: Vec<Source>,
    pub created_at: DateTime<Utc>,
}

/// A citation embedded in an assistant message. Value object, not
/// independently persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub document_name: String,
    pub page: u32,
    pub quote: String,
}

/// A ranked passage returned by the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub document_id: Uuid,
    pub document_name: String,
    pub page: u32,
    pub text: String,
    pub similarity: f32,
}

/// A grounded answer with its ordered citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub max_length: usize,
    pub overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_length: 1_000,
            overlap: 200,
        }
    }
}

/// Retrieval tuning. The defaults are calibrated for OpenAI's small
/// embedding model; a different model will want different values, so
/// nothing hardcodes them at the call sites.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_similarity: 0.5,
        }
    }
}
