pub mod chat;
pub mod chunking;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod retrieval;
pub mod storage;
pub mod store;
pub mod stores;

pub use chat::{ChatRequest, ChatResponse, ChatService, PIPELINE_FALLBACK_ANSWER};
pub use chunking::{chunk_pages, ChunkDraft};
pub use conversation::{derive_title, ConversationManager, TITLE_MAX_CHARS};
pub use embeddings::{
    EmbedError, Embedder, HashingEmbedder, OpenAiEmbedder, DEFAULT_EMBED_DIMENSIONS,
    DEFAULT_EMBED_MODEL, DEFAULT_EMBED_TIMEOUT,
};
pub use error::{ChatError, IngestError, StoreError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use generation::{
    AnswerGenerator, GenerationBackend, GenerationError, OpenAiGenerator, DEFAULT_GEN_MODEL,
    DEFAULT_GEN_TIMEOUT, NO_CONTEXT_ANSWER,
};
pub use ingest::{
    delete_document, discover_pdf_files, upload_document, IngestionPipeline, IngestionReport,
};
pub use models::{
    Answer, Candidate, Chunk, ChunkingOptions, Conversation, Document, DocumentStatus, Message,
    MessageRole, RetrievalConfig, Source,
};
pub use retrieval::RetrievalEngine;
pub use storage::{storage_key, BlobStorage, FsBlobStorage, MemoryBlobStorage, StorageError};
pub use store::{ChunkIndex, ConversationStore, DocumentStore, ScoredChunk};
pub use stores::MemoryStore;
