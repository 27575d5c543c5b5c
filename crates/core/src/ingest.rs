use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunking::chunk_pages;
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::models::{Chunk, ChunkingOptions, Document, DocumentStatus};
use crate::storage::{storage_key, BlobStorage};
use crate::store::{ChunkIndex, DocumentStore};

#[derive(Debug, Clone, Copy)]
pub struct IngestionReport {
    pub page_count: u32,
    pub chunk_count: usize,
}

/// Drives a single document through extract → chunk → embed → index and
/// owns its status transitions: `Pending → Processing → {Ready | Error}`.
pub struct IngestionPipeline<S, B, E: ?Sized, X> {
    store: Arc<S>,
    blobs: Arc<B>,
    embedder: Arc<E>,
    extractor: X,
    options: ChunkingOptions,
}

impl<S, B, E, X> IngestionPipeline<S, B, E, X>
where
    S: DocumentStore + ChunkIndex,
    B: BlobStorage,
    E: Embedder + ?Sized,
    X: PdfExtractor,
{
    pub fn new(
        store: Arc<S>,
        blobs: Arc<B>,
        embedder: Arc<E>,
        extractor: X,
        options: ChunkingOptions,
    ) -> Self {
        Self {
            store,
            blobs,
            embedder,
            extractor,
            options,
        }
    }

    /// Idempotently (re-)ingests a document. A re-run on an `Error` or
    /// `Pending` document replaces any prior chunks rather than duplicating
    /// them; a failed run leaves the previous chunk set untouched.
    pub async fn ingest(&self, document_id: Uuid) -> Result<IngestionReport, IngestError> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or(IngestError::NotFound(document_id))?;

        self.store
            .set_document_status(document_id, DocumentStatus::Processing)
            .await?;

        match self.run(&document).await {
            Ok(report) => {
                self.store
                    .mark_document_ready(document_id, report.page_count)
                    .await?;
                info!(
                    document_id = %document_id,
                    pages = report.page_count,
                    chunks = report.chunk_count,
                    "document ingested"
                );
                Ok(report)
            }
            Err(ingest_error) => {
                error!(document_id = %document_id, error = %ingest_error, "ingestion failed");
                if let Err(status_error) = self
                    .store
                    .set_document_status(document_id, DocumentStatus::Error)
                    .await
                {
                    error!(
                        document_id = %document_id,
                        error = %status_error,
                        "could not record error status"
                    );
                }
                Err(ingest_error)
            }
        }
    }

    async fn run(&self, document: &Document) -> Result<IngestionReport, IngestError> {
        let bytes = self
            .blobs
            .fetch(&document.storage_key)
            .await
            .map_err(|storage_error| IngestError::FetchFailed {
                key: document.storage_key.clone(),
                details: storage_error.to_string(),
            })?;

        let pages = self.extractor.extract_pages(&bytes)?;
        let drafts = chunk_pages(&pages, &self.options);

        // One embedding call at a time keeps us under the provider's rate
        // limit and makes per-document chunk ordering deterministic.
        let mut chunks = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let embedding = self.embedder.embed(&draft.content).await?;
            chunks.push(Chunk {
                id: Uuid::new_v4(),
                document_id: document.id,
                workspace_id: document.workspace_id.clone(),
                page_number: draft.page_number,
                chunk_index: draft.chunk_index,
                content: draft.content,
                embedding,
            });
        }

        // Prior chunks are only replaced once every embedding has succeeded,
        // so readers never observe a partial chunk set.
        self.store.delete_chunks_for_document(document.id).await?;
        self.store.insert_chunks(&chunks).await?;

        Ok(IngestionReport {
            page_count: pages.len() as u32,
            chunk_count: chunks.len(),
        })
    }
}

/// Stores the PDF bytes under the document's own key and creates the
/// `Pending` document row. Ingestion is a separate, explicitly triggered
/// step.
pub async fn upload_document<S, B>(
    store: &S,
    blobs: &B,
    workspace_id: &str,
    name: &str,
    bytes: &[u8],
) -> Result<Document, IngestError>
where
    S: DocumentStore,
    B: BlobStorage,
{
    let mut document = Document::new(workspace_id, name, "");
    document.storage_key = storage_key(workspace_id, document.id, bytes);
    blobs.store(bytes, &document.storage_key).await?;

    store.insert_document(&document).await?;
    info!(document_id = %document.id, name, "document uploaded");
    Ok(document)
}

/// Deletes a document, its chunks, and its stored blob. A failing blob
/// delete is logged and skipped; the rows still go so the index cannot
/// keep serving a document the user removed.
pub async fn delete_document<S, B>(store: &S, blobs: &B, id: Uuid) -> Result<(), IngestError>
where
    S: DocumentStore,
    B: BlobStorage,
{
    let document = store
        .get_document(id)
        .await?
        .ok_or(IngestError::NotFound(id))?;

    if let Err(storage_error) = blobs.delete(&document.storage_key).await {
        warn!(
            document_id = %id,
            key = %document.storage_key,
            error = %storage_error,
            "blob delete failed; removing rows anyway"
        );
    }

    store.delete_document(id).await?;
    info!(document_id = %id, "document deleted");
    Ok(())
}

/// Recursively finds the PDF files under a folder, sorted for stable
/// upload order.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::extractor::PageText;
    use crate::storage::MemoryBlobStorage;
    use crate::stores::MemoryStore;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    struct FixedExtractor {
        pages: Vec<PageText>,
    }

    impl PdfExtractor for FixedExtractor {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
            Ok(self.pages.clone())
        }
    }

    struct FailingExtractor;

    impl PdfExtractor for FailingExtractor {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
            Err(IngestError::ExtractionFailed("unreadable".to_string()))
        }
    }

    fn pages() -> Vec<PageText> {
        vec![
            PageText {
                number: 1,
                text: "First page body.".to_string(),
            },
            PageText {
                number: 2,
                text: "Second page body.".to_string(),
            },
        ]
    }

    async fn seed_document(store: &MemoryStore, blobs: &MemoryBlobStorage) -> Document {
        let document = Document::new("ws-1", "manual.pdf", "ws-1/manual.pdf");
        store.insert_document(&document).await.unwrap();
        blobs.store(b"%PDF-1.4", "ws-1/manual.pdf").await.unwrap();
        document
    }

    fn pipeline<X: PdfExtractor>(
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStorage>,
        extractor: X,
    ) -> IngestionPipeline<MemoryStore, MemoryBlobStorage, HashingEmbedder, X> {
        IngestionPipeline::new(
            store,
            blobs,
            Arc::new(HashingEmbedder::default()),
            extractor,
            ChunkingOptions::default(),
        )
    }

    #[tokio::test]
    async fn successful_ingest_marks_ready_with_page_count() {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStorage::default());
        let document = seed_document(&store, &blobs).await;
        assert_eq!(document.status, DocumentStatus::Pending);

        let report = pipeline(store.clone(), blobs, FixedExtractor { pages: pages() })
            .ingest(document.id)
            .await
            .unwrap();

        let stored = store.get_document(document.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Ready);
        assert_eq!(stored.page_count, Some(2));
        assert_eq!(report.chunk_count, 2);
        assert_eq!(store.chunk_count(document.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStorage::default());

        let result = pipeline(store, blobs, FixedExtractor { pages: pages() })
            .ingest(Uuid::new_v4())
            .await;

        assert!(matches!(result, Err(IngestError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_blob_is_fetch_failed_and_marks_error() {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStorage::default());
        let document = Document::new("ws-1", "gone.pdf", "ws-1/gone.pdf");
        store.insert_document(&document).await.unwrap();

        let result = pipeline(store.clone(), blobs, FixedExtractor { pages: pages() })
            .ingest(document.id)
            .await;

        assert!(matches!(result, Err(IngestError::FetchFailed { .. })));
        let stored = store.get_document(document.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn failed_ingest_leaves_prior_chunks_untouched() {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStorage::default());
        let document = seed_document(&store, &blobs).await;

        pipeline(store.clone(), blobs.clone(), FixedExtractor { pages: pages() })
            .ingest(document.id)
            .await
            .unwrap();
        let before = store.chunk_count(document.id).await.unwrap();

        let result = pipeline(store.clone(), blobs, FailingExtractor)
            .ingest(document.id)
            .await;

        assert!(matches!(result, Err(IngestError::ExtractionFailed(_))));
        let stored = store.get_document(document.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Error);
        assert_eq!(store.chunk_count(document.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn retry_does_not_duplicate_chunks() {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStorage::default());
        let document = seed_document(&store, &blobs).await;
        let pipeline = pipeline(store.clone(), blobs, FixedExtractor { pages: pages() });

        pipeline.ingest(document.id).await.unwrap();
        pipeline.ingest(document.id).await.unwrap();

        assert_eq!(store.chunk_count(document.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upload_creates_a_pending_document_with_stored_bytes() {
        let store = MemoryStore::new();
        let blobs = MemoryBlobStorage::default();

        let document = upload_document(&store, &blobs, "ws-1", "manual.pdf", b"%PDF-1.4")
            .await
            .unwrap();

        assert_eq!(document.status, DocumentStatus::Pending);
        assert_eq!(document.name, "manual.pdf");
        let fetched = blobs.fetch(&document.storage_key).await.unwrap();
        assert_eq!(fetched, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn deleting_one_of_two_identical_uploads_keeps_the_other_ingestable() {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStorage::default());

        let first = upload_document(store.as_ref(), blobs.as_ref(), "ws-1", "a.pdf", b"%PDF-1.4 same")
            .await
            .unwrap();
        let second = upload_document(store.as_ref(), blobs.as_ref(), "ws-1", "b.pdf", b"%PDF-1.4 same")
            .await
            .unwrap();
        assert_ne!(first.storage_key, second.storage_key);

        delete_document(store.as_ref(), blobs.as_ref(), first.id)
            .await
            .unwrap();

        pipeline(store.clone(), blobs, FixedExtractor { pages: pages() })
            .ingest(second.id)
            .await
            .unwrap();
        let stored = store.get_document(second.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn delete_removes_rows_even_when_the_blob_is_already_gone() {
        let store = MemoryStore::new();
        let blobs = MemoryBlobStorage::default();
        let document = Document::new("ws-1", "manual.pdf", "ws-1/never-stored.pdf");
        store.insert_document(&document).await.unwrap();

        delete_document(&store, &blobs, document.id).await.unwrap();
        assert!(store.get_document(document.id).await.unwrap().is_none());
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.pdf"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"not a pdf"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }
}
