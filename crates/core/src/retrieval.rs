use std::sync::Arc;
use tracing::debug;

use crate::embeddings::Embedder;
use crate::error::ChatError;
use crate::models::{Candidate, RetrievalConfig};
use crate::store::ChunkIndex;

/// Embeds a question, runs the workspace-scoped similarity search, and
/// keeps only candidates above the acceptance threshold. Pure ranking: no
/// side effects, deterministic for a fixed index state and query.
pub struct RetrievalEngine<S, E: ?Sized> {
    index: Arc<S>,
    embedder: Arc<E>,
    config: RetrievalConfig,
}

impl<S, E> RetrievalEngine<S, E>
where
    S: ChunkIndex,
    E: Embedder + ?Sized,
{
    pub fn new(index: Arc<S>, embedder: Arc<E>, config: RetrievalConfig) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    /// An empty result means "no relevant context", not "take the best of a
    /// bad lot": sub-threshold candidates are discarded entirely.
    pub async fn retrieve(
        &self,
        query: &str,
        workspace_id: &str,
    ) -> Result<Vec<Candidate>, ChatError> {
        let query_vector = self.embedder.embed(query).await?;

        let hits = self
            .index
            .search_chunks(workspace_id, &query_vector, self.config.top_k)
            .await?;

        let candidates: Vec<Candidate> = hits
            .into_iter()
            .filter(|hit| hit.similarity > self.config.min_similarity)
            .map(|hit| Candidate {
                document_id: hit.chunk.document_id,
                document_name: hit.document_name,
                page: hit.chunk.page_number,
                text: hit.chunk.content,
                similarity: hit.similarity,
            })
            .collect();

        debug!(
            workspace_id,
            candidates = candidates.len(),
            "retrieval complete"
        );

        Ok(candidates)
    }
}
