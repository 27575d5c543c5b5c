use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Chunk, Conversation, Document, DocumentStatus, Message};
use crate::store::{ChunkIndex, ConversationStore, DocumentStore, ScoredChunk};

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    documents: HashMap<Uuid, Document>,
    chunks: Vec<Chunk>,
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<Message>,
}

/// Reference store: every relation in process memory, with optional JSON
/// snapshots so the CLI survives across runs. Implements all three
/// persistence seams.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let state: State = serde_json::from_slice(&bytes)?;
                Ok(Self {
                    state: RwLock::new(state),
                })
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(error) => Err(error.into()),
        }
    }

    pub async fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let state = self.state.read().await;
        let bytes = serde_json::to_vec(&*state)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() {
        return 0.0;
    }

    let mut dot = 0f32;
    let mut left_norm = 0f32;
    let mut right_norm = 0f32;
    for (l, r) in left.iter().zip(right.iter()) {
        dot += l * r;
        left_norm += l * l;
        right_norm += r * r;
    }

    let denominator = left_norm.sqrt() * right_norm.sqrt();
    if denominator > 0.0 {
        dot / denominator
    } else {
        0.0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .documents
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.state.read().await.documents.get(&id).cloned())
    }

    async fn list_documents(&self, workspace_id: &str) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|document| document.workspace_id == workspace_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(documents)
    }

    async fn set_document_status(&self, id: Uuid, status: DocumentStatus) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let document = state
            .documents
            .get_mut(&id)
            .ok_or(StoreError::DocumentNotFound(id))?;
        document.status = status;
        Ok(())
    }

    async fn mark_document_ready(&self, id: Uuid, page_count: u32) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let document = state
            .documents
            .get_mut(&id)
            .ok_or(StoreError::DocumentNotFound(id))?;
        document.status = DocumentStatus::Ready;
        document.page_count = Some(page_count);
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .documents
            .remove(&id)
            .ok_or(StoreError::DocumentNotFound(id))?;
        state.chunks.retain(|chunk| chunk.document_id != id);
        Ok(())
    }
}

#[async_trait]
impl ChunkIndex for MemoryStore {
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        // A delete racing an in-flight ingest must not leave orphan chunks.
        for chunk in chunks {
            if !state.documents.contains_key(&chunk.document_id) {
                return Err(StoreError::DocumentNotFound(chunk.document_id));
            }
        }
        state.chunks.extend_from_slice(chunks);
        Ok(())
    }

    async fn delete_chunks_for_document(&self, document_id: Uuid) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .chunks
            .retain(|chunk| chunk.document_id != document_id);
        Ok(())
    }

    async fn chunk_count(&self, document_id: Uuid) -> Result<usize, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .chunks
            .iter()
            .filter(|chunk| chunk.document_id == document_id)
            .count())
    }

    async fn search_chunks(
        &self,
        workspace_id: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let state = self.state.read().await;

        let mut scored: Vec<ScoredChunk> = state
            .chunks
            .iter()
            .filter(|chunk| chunk.workspace_id == workspace_id)
            .filter_map(|chunk| {
                let document = state.documents.get(&chunk.document_id)?;
                if document.status != DocumentStatus::Ready {
                    return None;
                }
                Some(ScoredChunk {
                    chunk: chunk.clone(),
                    document_name: document.name.clone(),
                    similarity: cosine_similarity(query_vector, &chunk.embedding),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.chunk.document_id.cmp(&b.chunk.document_id))
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        scored.truncate(limit);

        Ok(scored)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn list_conversations(&self, workspace_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|conversation| conversation.workspace_id == workspace_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(conversations)
    }

    async fn touch_conversation(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(&id)
            .ok_or(StoreError::ConversationNotFound(id))?;
        conversation.updated_at = at;
        Ok(())
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::ConversationNotFound(message.conversation_id));
        }
        state.messages.push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .iter()
            .filter(|message| message.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn last_message(&self, conversation_id: Uuid) -> Result<Option<Message>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .iter()
            .rev()
            .find(|message| message.conversation_id == conversation_id)
            .cloned())
    }

    async fn delete_message(&self, id: Uuid) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .messages
            .retain(|message| message.id != id);
        Ok(())
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .conversations
            .remove(&id)
            .ok_or(StoreError::ConversationNotFound(id))?;
        state.messages.retain(|message| message.conversation_id != id);
        Ok(())
    }
}
