use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use eyeqcheck_rag::api::{create_router, AppState};
use eyeqcheck_rag::application::{ChatService, HybridRetriever, KnowledgeBaseService, SttService};
use eyeqcheck_rag::domain::ports::VectorStore;
use eyeqcheck_rag::infrastructure::config::VectorStoreBackend;
use eyeqcheck_rag::infrastructure::{
    build_llm, telemetry, AppConfig, Bm25Index, InMemoryVectorStore, QdrantVectorStore,
    TextEmbedding, WhisperTranscription,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    telemetry::init(&config.config.logging);

    let embedding = Arc::new(TextEmbedding::from_config(&config.config.embedding));
    let vector_store: Arc<dyn VectorStore> = match config.config.vector_store.backend {
        VectorStoreBackend::Qdrant => Arc::new(
            QdrantVectorStore::new(
                &config.config.vector_store.url,
                &config.config.vector_store.collection,
                config.config.embedding.dimension,
            )
            .await?,
        ),
        VectorStoreBackend::InMemory => Arc::new(InMemoryVectorStore::new()),
    };
    info!(backend = ?config.config.vector_store.backend, "vector store initialized");

    let retriever = Arc::new(HybridRetriever::from_config(
        embedding,
        vector_store,
        Arc::new(Bm25Index::new()?),
        &config.config.retrieval,
    ));

    if config.config.knowledge_base.index_on_startup {
        let knowledge_base =
            KnowledgeBaseService::from_config(retriever.clone(), &config.config.knowledge_base);
        knowledge_base
            .load_dir(&config.config.knowledge_base.path)
            .await
            .context("failed to load knowledge base")?;
    }

    let llm = build_llm(&config);
    info!(provider = llm.provider(), model = llm.model(), "language model ready");
    let chat = Arc::new(ChatService::new(retriever, llm, &config));

    let openai_key = config
        .config
        .secrets
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY is required for transcription")?;
    let transcriber = Arc::new(WhisperTranscription::new(&config.config.stt, openai_key)?);
    let stt = Arc::new(SttService::from_config(transcriber, &config));

    let addr = SocketAddr::new(
        config.config.server.host.parse()?,
        config.config.server.port,
    );
    let app = create_router(AppState::new(config, chat, stt));

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
