use anyhow::Context;
use clap::{Parser, Subcommand};
use pdf_chat_core::{
    delete_document, discover_pdf_files, upload_document, AnswerGenerator, ChatRequest,
    ChatService, ChunkingOptions, ConversationManager, ConversationStore, DocumentStore, Embedder,
    FsBlobStorage, HashingEmbedder, IngestionPipeline, LopdfExtractor, MemoryStore,
    OpenAiEmbedder, OpenAiGenerator, RetrievalConfig, RetrievalEngine, DEFAULT_EMBED_DIMENSIONS,
    DEFAULT_EMBED_MODEL, DEFAULT_EMBED_TIMEOUT, DEFAULT_GEN_MODEL, DEFAULT_GEN_TIMEOUT,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the store snapshot and uploaded blobs.
    #[arg(long, default_value = ".pdf-chat")]
    data_dir: PathBuf,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    api_base: String,

    /// API key for the embedding and generation endpoints.
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: Option<String>,

    /// Embedding model identity. Must stay fixed for the lifetime of a
    /// workspace's index.
    #[arg(long, default_value = DEFAULT_EMBED_MODEL)]
    embed_model: String,

    /// Expected embedding dimensionality.
    #[arg(long, default_value_t = DEFAULT_EMBED_DIMENSIONS)]
    embed_dimensions: usize,

    /// Generation model.
    #[arg(long, default_value = DEFAULT_GEN_MODEL)]
    gen_model: String,

    /// Use the offline hashing embedder instead of the HTTP endpoint.
    /// Never mix this with API-embedded documents in the same workspace.
    #[arg(long, default_value_t = false)]
    hash_embedder: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a PDF file (or every PDF under a folder) into a workspace.
    Upload {
        /// A PDF file, or a folder scanned recursively.
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        workspace: String,
    },
    /// Run the ingestion pipeline for an uploaded document.
    Ingest {
        #[arg(long)]
        document: Uuid,
    },
    /// Ask a question against a workspace's ready documents.
    Ask {
        /// The question. Omitted when regenerating.
        #[arg(long, default_value = "")]
        message: String,
        #[arg(long)]
        workspace: String,
        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<Uuid>,
        /// Regenerate the last answer instead of asking a new question.
        #[arg(long, default_value_t = false)]
        regenerate: bool,
        /// Similarity acceptance threshold.
        #[arg(long, default_value_t = 0.5)]
        min_similarity: f32,
        /// Number of passages handed to the generator.
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// List the documents of a workspace, newest first.
    Documents {
        #[arg(long)]
        workspace: String,
    },
    /// List the conversations of a workspace in recency order.
    Conversations {
        #[arg(long)]
        workspace: String,
    },
    /// Print a conversation's messages with their citations.
    History {
        #[arg(long)]
        conversation: Uuid,
    },
    /// Delete a document, its chunks, and its stored file.
    DeleteDocument {
        #[arg(long)]
        document: Uuid,
    },
    /// Delete a conversation and its messages.
    DeleteConversation {
        #[arg(long)]
        conversation: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %chrono::Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    let snapshot = cli.data_dir.join("state.json");
    let store = Arc::new(
        MemoryStore::load_snapshot(&snapshot)
            .await
            .context("loading store snapshot")?,
    );
    let blobs = Arc::new(FsBlobStorage::new(cli.data_dir.join("blobs")));

    let embedder: Arc<dyn Embedder> = if cli.hash_embedder {
        Arc::new(HashingEmbedder::default())
    } else {
        Arc::new(
            OpenAiEmbedder::new(
                &cli.api_base,
                cli.api_key.clone(),
                &cli.embed_model,
                cli.embed_dimensions,
                DEFAULT_EMBED_TIMEOUT,
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?,
        )
    };

    match cli.command {
        Command::Upload { path, workspace } => {
            for file in pdf_files(&path)? {
                let bytes = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                let name = file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("upload.pdf");

                let document = upload_document(store.as_ref(), blobs.as_ref(), &workspace, name, &bytes)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                println!("uploaded {} as document {}", name, document.id);
            }
        }
        Command::Ingest { document } => {
            let pipeline = IngestionPipeline::new(
                store.clone(),
                blobs.clone(),
                embedder.clone(),
                LopdfExtractor,
                ChunkingOptions::default(),
            );

            let report = pipeline
                .ingest(document)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!(
                "document {} ready: {} pages, {} chunks",
                document, report.page_count, report.chunk_count
            );
        }
        Command::Ask {
            message,
            workspace,
            conversation,
            regenerate,
            min_similarity,
            top_k,
        } => {
            let generator = OpenAiGenerator::new(
                &cli.api_base,
                cli.api_key.clone(),
                &cli.gen_model,
                DEFAULT_GEN_TIMEOUT,
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let service = ChatService::new(
                ConversationManager::new(store.clone()),
                RetrievalEngine::new(
                    store.clone(),
                    embedder.clone(),
                    RetrievalConfig {
                        top_k,
                        min_similarity,
                    },
                ),
                AnswerGenerator::new(generator),
            );

            let response = service
                .answer(ChatRequest {
                    message,
                    workspace_id: workspace,
                    conversation_id: conversation,
                    regenerate,
                })
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("conversation: {}", response.conversation_id);
            println!("{}", response.answer);
            for source in response.sources {
                println!("  [{} p.{}] \"{}\"", source.document_name, source.page, source.quote);
            }
        }
        Command::Documents { workspace } => {
            for document in store
                .list_documents(&workspace)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?
            {
                println!(
                    "{} {:?} pages={} {}",
                    document.id,
                    document.status,
                    document
                        .page_count
                        .map(|count| count.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    document.name
                );
            }
        }
        Command::Conversations { workspace } => {
            for conversation in store
                .list_conversations(&workspace)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?
            {
                println!(
                    "{} {} {}",
                    conversation.id,
                    conversation.updated_at.to_rfc3339(),
                    conversation.title
                );
            }
        }
        Command::History { conversation } => {
            for message in store
                .list_messages(conversation)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?
            {
                println!("[{:?}] {}", message.role, message.content);
                for source in message.sources {
                    println!("  [{} p.{}] \"{}\"", source.document_name, source.page, source.quote);
                }
            }
        }
        Command::DeleteDocument { document } => {
            delete_document(store.as_ref(), blobs.as_ref(), document)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("deleted document {document}");
        }
        Command::DeleteConversation { conversation } => {
            store
                .delete_conversation(conversation)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("deleted conversation {conversation}");
        }
    }

    store
        .save_snapshot(&snapshot)
        .await
        .context("saving store snapshot")?;
    info!("state saved to {}", snapshot.display());

    Ok(())
}

fn pdf_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_dir() {
        let files = discover_pdf_files(path);
        anyhow::ensure!(!files.is_empty(), "no pdf files found in {}", path.display());
        Ok(files)
    } else {
        Ok(vec![path.to_path_buf()])
    }
}
